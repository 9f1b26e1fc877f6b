//! Process-wide registry of log templates.
//!
//! A template is everything about a log call that is the same on every
//! execution: the format string, severity, source location and argument
//! types. Each distinct call site is registered once, on its first execution,
//! and is referred to by a compact [`TemplateId`] afterwards. Entries are never
//! removed and never change after insertion.
//!
//! # Thread Safety
//!
//! Each call site caches its id in a write-once cell ([`CallSite`]), so
//! concurrent first executions of the same site insert exactly one template
//! and every thread observes the same id. The registry itself is guarded by a
//! read-write lock that is only taken for writing on a site's first use.

use std::fmt;
use std::sync::{Arc, OnceLock};

use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::loggable::Loggable;
use crate::severity::Severity;

lazy_static! {
    static ref GLOBAL_REGISTRY: TemplateRegistry = TemplateRegistry::new();
}

/// Identifier of a registered template. Ids are dense and start at 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemplateId(u32);

impl TemplateId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: TemplateId,
    pub severity: Severity,
    /// Module path of the call site.
    pub category: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub format: &'static str,
    /// Type tag of each argument at the first call, in call order. Sites in
    /// generic code may log other types later; events carry their own tags.
    pub argument_tags: Vec<u8>,
}

/// The static description of one logging call site.
///
/// The logging macros declare one `static CallSite` per invocation; its
/// `cached` cell holds the template id once the site has been registered.
/// A call site binds to the first registry it is registered with, which for
/// the macros is always [`TemplateRegistry::global`].
pub struct CallSite {
    severity: Severity,
    category: &'static str,
    file: &'static str,
    line: u32,
    format: &'static str,
    cached: OnceLock<TemplateId>,
}

impl CallSite {
    pub const fn new(
        severity: Severity,
        category: &'static str,
        file: &'static str,
        line: u32,
        format: &'static str,
    ) -> Self {
        Self {
            severity,
            category,
            file,
            line,
            format,
            cached: OnceLock::new(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn format(&self) -> &'static str {
        self.format
    }

    /// The cached id, if this site has already been registered.
    pub fn template_id(&self) -> Option<TemplateId> {
        self.cached.get().copied()
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("severity", &self.severity)
            .field("location", &format_args!("{}:{}", self.file, self.line))
            .field("format", &self.format)
            .field("cached", &self.cached.get())
            .finish()
    }
}

/// Append-only table of templates, indexed by id.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: RwLock<Vec<Arc<Template>>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used by every [`Session`](crate::Session).
    pub fn global() -> &'static TemplateRegistry {
        &GLOBAL_REGISTRY
    }

    /// Returns the id of `site`, registering it on first use.
    ///
    /// The argument tags are taken from `args` only on that first call. The
    /// argument count of a site never changes, but its types can: a `static`
    /// inside a generic function is shared by every instantiation.
    #[inline]
    pub fn resolve(&self, site: &'static CallSite, args: &[&dyn Loggable]) -> TemplateId {
        *site.cached.get_or_init(|| {
            let id = self.insert(
                site.severity,
                site.category,
                site.file,
                site.line,
                site.format,
                args.iter().map(|arg| arg.tag()).collect(),
            );
            tracing::trace!(template = %id, format = site.format, "registered log template");
            id
        })
    }

    /// Inserts a template without call-site caching and returns its new id.
    pub fn insert(
        &self,
        severity: Severity,
        category: &'static str,
        file: &'static str,
        line: u32,
        format: &'static str,
        argument_tags: Vec<u8>,
    ) -> TemplateId {
        let mut templates = self.templates.write();
        let id = TemplateId(templates.len() as u32 + 1);
        templates.push(Arc::new(Template {
            id,
            severity,
            category,
            file,
            line,
            format,
            argument_tags,
        }));
        id
    }

    /// Looks up a template by id.
    pub fn get(&self, id: TemplateId) -> Option<Arc<Template>> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.templates.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Checks that every `{` opens a placeholder closed by a `}`, with `{{` and
/// `}}` as escapes. Used by the logging macros in a const context.
#[doc(hidden)]
pub const fn validate_format(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut in_brace = false;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if !in_brace => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                    i += 2;
                    continue;
                }
                in_brace = true;
            }
            b'{' => return false, // nested
            b'}' if in_brace => in_brace = false,
            b'}' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'}' {
                    i += 2;
                    continue;
                }
                return false; // unmatched
            }
            _ => {}
        }
        i += 1;
    }
    !in_brace
}

/// Number of placeholders in a format string accepted by [`validate_format`].
#[doc(hidden)]
pub const fn count_placeholders(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut count = 0;

    while i < bytes.len() {
        if (bytes[i] == b'{' || bytes[i] == b'}')
            && i + 1 < bytes.len()
            && bytes[i + 1] == bytes[i]
        {
            i += 2;
            continue;
        }
        if bytes[i] == b'{' {
            count += 1;
        }
        i += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    static SITE: CallSite = CallSite::new(Severity::Info, "tests", "registry.rs", 1, "Test: {}");

    #[test]
    fn test_resolve_caches_per_call_site() {
        let registry = TemplateRegistry::new();
        let first = registry.resolve(&SITE, &[&5u32]);
        let second = registry.resolve(&SITE, &[&6u32]);

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(SITE.template_id(), Some(first));

        let template = registry.get(first).unwrap();
        assert_eq!(template.format, "Test: {}");
        assert_eq!(template.argument_tags, vec![crate::loggable::tag::U32]);
    }

    #[test]
    fn test_ids_are_dense() {
        let registry = TemplateRegistry::new();
        let a = registry.insert(Severity::Info, "m", "f", 1, "a", vec![]);
        let b = registry.insert(Severity::Info, "m", "f", 2, "b", vec![]);
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
        assert!(registry.get(TemplateId::new(0)).is_none());
        assert!(registry.get(TemplateId::new(3)).is_none());
    }

    #[test]
    fn test_format_validation() {
        assert!(validate_format("Test: {} value={}"));
        assert!(!validate_format("Test: {} value={")); // Unclosed brace
        assert!(!validate_format("Test: } value={}")); // Unopened brace
        assert!(!validate_format("Test: {{}")); // Escape then unclosed
        assert!(validate_format("Test: {{escaped}} {}")); // Escaped braces
    }

    #[test]
    fn test_placeholder_count() {
        assert_eq!(count_placeholders("no placeholders"), 0);
        assert_eq!(count_placeholders("Hello {}!"), 1);
        assert_eq!(count_placeholders("{{literal}} {} and {:?}"), 2);
    }

    #[test]
    fn test_const_evaluation() {
        const VALID: bool = validate_format("Status: {}, Count: {}");
        const COUNT: usize = count_placeholders("Status: {}, Count: {}");
        assert!(VALID);
        assert_eq!(COUNT, 2);
    }
}
