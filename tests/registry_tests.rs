use binlog::{CallSite, Loggable, Severity, TemplateId, TemplateRegistry};
use std::collections::HashSet;
use std::sync::Barrier;
use std::thread;

static CONCURRENT_SITE: CallSite = CallSite::new(Severity::Info, "registry_tests", file!(), 10, "concurrent {}");
static FIRST_SITE: CallSite = CallSite::new(Severity::Debug, "registry_tests", file!(), 20, "first {} {}");
static SECOND_SITE: CallSite = CallSite::new(Severity::Debug, "registry_tests", file!(), 21, "second");
static UNICODE_SITE: CallSite = CallSite::new(Severity::Error, "registry_tests", file!(), 30, "Hello, 世界! {} 🌍");

#[test]
fn test_site_resolves_to_same_id() {
    let registry = TemplateRegistry::global();
    let args: [&dyn Loggable; 2] = [&1u8, &"x"];
    let id1 = registry.resolve(&FIRST_SITE, &args);
    let id2 = registry.resolve(&FIRST_SITE, &args);
    assert_eq!(id1, id2, "Same call site should get same ID");
    assert_eq!(FIRST_SITE.template_id(), Some(id1));

    let other = registry.resolve(&SECOND_SITE, &[]);
    assert_ne!(id1, other, "Different call sites should get different IDs");
}

#[test]
fn test_template_records_first_use() {
    let registry = TemplateRegistry::global();
    let id = registry.resolve(&UNICODE_SITE, &[&3.5f64]);

    let template = registry.get(id).expect("registered template");
    assert_eq!(template.id, id);
    assert_eq!(template.severity, Severity::Error);
    assert_eq!(template.format, "Hello, 世界! {} 🌍");
    assert_eq!(template.line, 30);
    assert_eq!(template.argument_tags, vec![b'd']);
}

#[test]
fn test_invalid_id() {
    let registry = TemplateRegistry::new();
    assert!(registry.get(TemplateId::new(0)).is_none(), "Id 0 is never assigned");
    assert!(registry.get(TemplateId::new(u32::MAX)).is_none(), "Invalid ID should return None");
}

#[test]
fn test_ids_are_dense_from_one() {
    let registry = TemplateRegistry::new();
    assert!(registry.is_empty());

    let ids: Vec<u32> = (0..5)
        .map(|line| {
            registry
                .insert(Severity::Info, "registry_tests", file!(), line, "dense", Vec::new())
                .get()
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(registry.len(), 5);
}

#[test]
fn test_concurrent_first_use() {
    const THREADS: usize = 8;
    let barrier = Barrier::new(THREADS);

    let ids: HashSet<TemplateId> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    TemplateRegistry::global().resolve(&CONCURRENT_SITE, &[&(i as u32)])
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(ids.len(), 1, "All threads must observe one id");
    let id = ids.into_iter().next().unwrap();
    let template = TemplateRegistry::global().get(id).unwrap();
    assert_eq!(template.format, "concurrent {}");
}
