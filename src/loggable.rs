use std::borrow::Cow;
use std::rc::Rc;
use std::sync::Arc;

/// One-byte type tags written in front of every argument.
///
/// Tags are printable ASCII so a hex dump of a stream stays readable.
pub mod tag {
    pub const BOOL: u8 = b'y';
    pub const CHAR: u8 = b'c';
    pub const I8: u8 = b'b';
    pub const U8: u8 = b'B';
    pub const I16: u8 = b'h';
    pub const U16: u8 = b'H';
    pub const I32: u8 = b'i';
    pub const U32: u8 = b'I';
    pub const I64: u8 = b'l';
    pub const U64: u8 = b'L';
    pub const F32: u8 = b'f';
    pub const F64: u8 = b'd';
    pub const STR: u8 = b's';
    pub const BYTES: u8 = b'x';
    pub const SEQUENCE: u8 = b'[';
    pub const OPTION: u8 = b'?';
    pub const TUPLE: u8 = b'(';
    pub const STRUCT: u8 = b'{';
    pub const ENUM: u8 = b'/';
}

/// A type that can be written as an argument of a log event.
///
/// Every argument is written as its [`tag`](Loggable::tag) byte followed by
/// [`encode`](Loggable::encode)'s payload. `encoded_len` must return the exact
/// payload size: the queue reserves that many bytes before encoding and uses
/// it to decide whether the record fits under the channel ceiling.
///
/// Types without an implementation cannot be passed to the logging macros;
/// this is checked at compile time. User structs and unit enums opt in with
/// [`loggable_struct!`](crate::loggable_struct) and
/// [`loggable_enum!`](crate::loggable_enum).
pub trait Loggable {
    /// Type tag written before the payload.
    fn tag(&self) -> u8;

    /// Exact payload size in bytes, tag excluded.
    fn encoded_len(&self) -> usize;

    /// Appends the payload to `out`.
    fn encode(&self, out: &mut Vec<u8>);
}

/// Size of `value` on the wire, tag included.
#[inline(always)]
pub fn tagged_len(value: &dyn Loggable) -> usize {
    1 + value.encoded_len()
}

/// Writes `value`'s tag and payload.
#[inline(always)]
pub fn encode_tagged(value: &dyn Loggable, out: &mut Vec<u8>) {
    out.push(value.tag());
    value.encode(out);
}

/// Writes a `u16` length-prefixed string. Names longer than `u16::MAX` bytes
/// are cut at the nearest char boundary below the limit.
#[doc(hidden)]
pub fn encode_str16(s: &str, out: &mut Vec<u8>) {
    let s = truncate_str(s, u16::MAX as usize);
    out.extend_from_slice(&(s.len() as u16).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

#[doc(hidden)]
pub fn str16_len(s: &str) -> usize {
    2 + truncate_str(s, u16::MAX as usize).len()
}

fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

macro_rules! impl_fixed {
    ($($ty:ty => $tag:expr),* $(,)?) => {
        $(
            impl Loggable for $ty {
                #[inline(always)]
                fn tag(&self) -> u8 {
                    $tag
                }

                #[inline(always)]
                fn encoded_len(&self) -> usize {
                    std::mem::size_of::<$ty>()
                }

                #[inline(always)]
                fn encode(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_fixed! {
    i8 => tag::I8,
    u8 => tag::U8,
    i16 => tag::I16,
    u16 => tag::U16,
    i32 => tag::I32,
    u32 => tag::U32,
    i64 => tag::I64,
    u64 => tag::U64,
}

impl Loggable for usize {
    fn tag(&self) -> u8 {
        tag::U64
    }

    fn encoded_len(&self) -> usize {
        8
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(*self as u64).to_le_bytes());
    }
}

impl Loggable for isize {
    fn tag(&self) -> u8 {
        tag::I64
    }

    fn encoded_len(&self) -> usize {
        8
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(*self as i64).to_le_bytes());
    }
}

impl Loggable for f32 {
    fn tag(&self) -> u8 {
        tag::F32
    }

    fn encoded_len(&self) -> usize {
        4
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_le_bytes());
    }
}

impl Loggable for f64 {
    fn tag(&self) -> u8 {
        tag::F64
    }

    fn encoded_len(&self) -> usize {
        8
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_le_bytes());
    }
}

impl Loggable for bool {
    fn tag(&self) -> u8 {
        tag::BOOL
    }

    fn encoded_len(&self) -> usize {
        1
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
}

impl Loggable for char {
    fn tag(&self) -> u8 {
        tag::CHAR
    }

    fn encoded_len(&self) -> usize {
        4
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(*self as u32).to_le_bytes());
    }
}

impl Loggable for str {
    fn tag(&self) -> u8 {
        tag::STR
    }

    fn encoded_len(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.len() as u32).to_le_bytes());
        out.extend_from_slice(self.as_bytes());
    }
}

impl Loggable for String {
    fn tag(&self) -> u8 {
        tag::STR
    }

    fn encoded_len(&self) -> usize {
        self.as_str().encoded_len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.as_str().encode(out)
    }
}

impl Loggable for Cow<'_, str> {
    fn tag(&self) -> u8 {
        tag::STR
    }

    fn encoded_len(&self) -> usize {
        self.as_ref().encoded_len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.as_ref().encode(out)
    }
}

/// Logs a byte slice as an opaque blob rather than a sequence of `u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bytes<'a>(pub &'a [u8]);

impl Loggable for Bytes<'_> {
    fn tag(&self) -> u8 {
        tag::BYTES
    }

    fn encoded_len(&self) -> usize {
        4 + self.0.len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.0.len() as u32).to_le_bytes());
        out.extend_from_slice(self.0);
    }
}

impl<T: Loggable> Loggable for [T] {
    fn tag(&self) -> u8 {
        tag::SEQUENCE
    }

    fn encoded_len(&self) -> usize {
        4 + self.iter().map(|item| tagged_len(item)).sum::<usize>()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.len() as u32).to_le_bytes());
        for item in self {
            encode_tagged(item, out);
        }
    }
}

impl<T: Loggable, const N: usize> Loggable for [T; N] {
    fn tag(&self) -> u8 {
        tag::SEQUENCE
    }

    fn encoded_len(&self) -> usize {
        self.as_slice().encoded_len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.as_slice().encode(out)
    }
}

impl<T: Loggable> Loggable for Vec<T> {
    fn tag(&self) -> u8 {
        tag::SEQUENCE
    }

    fn encoded_len(&self) -> usize {
        self.as_slice().encoded_len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.as_slice().encode(out)
    }
}

impl<T: Loggable> Loggable for Option<T> {
    fn tag(&self) -> u8 {
        tag::OPTION
    }

    fn encoded_len(&self) -> usize {
        1 + self.as_ref().map_or(0, |value| tagged_len(value))
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Some(value) => {
                out.push(1);
                encode_tagged(value, out);
            }
            None => out.push(0),
        }
    }
}

macro_rules! impl_forwarding {
    ($($wrapper:ident),*) => {
        $(
            impl<T: Loggable + ?Sized> Loggable for $wrapper<T> {
                fn tag(&self) -> u8 {
                    (**self).tag()
                }

                fn encoded_len(&self) -> usize {
                    (**self).encoded_len()
                }

                fn encode(&self, out: &mut Vec<u8>) {
                    (**self).encode(out)
                }
            }
        )*
    };
}

impl_forwarding!(Box, Rc, Arc);

impl<T: Loggable + ?Sized> Loggable for &T {
    fn tag(&self) -> u8 {
        (**self).tag()
    }

    fn encoded_len(&self) -> usize {
        (**self).encoded_len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        (**self).encode(out)
    }
}

macro_rules! impl_tuple {
    ($count:expr; $($name:ident),+) => {
        impl<$($name: Loggable),+> Loggable for ($($name,)+) {
            fn tag(&self) -> u8 {
                tag::TUPLE
            }

            #[allow(non_snake_case)]
            fn encoded_len(&self) -> usize {
                let ($($name,)+) = self;
                1 $(+ tagged_len($name))+
            }

            #[allow(non_snake_case)]
            fn encode(&self, out: &mut Vec<u8>) {
                let ($($name,)+) = self;
                out.push($count);
                $(encode_tagged($name, out);)+
            }
        }
    };
}

impl_tuple!(1; A);
impl_tuple!(2; A, B);
impl_tuple!(3; A, B, C);
impl_tuple!(4; A, B, C, D);

/// Implements [`Loggable`] for a struct by logging the listed fields.
///
/// The struct is written with its type name and each field's name, so a reader
/// can render it without knowing the Rust type.
///
/// ```
/// use binlog::loggable_struct;
///
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// loggable_struct!(Point { x, y });
/// ```
///
/// The field count travels in one byte, so more than 255 fields is a compile
/// error:
///
/// ```compile_fail
/// # use binlog::loggable_struct;
/// # struct Wide {
/// #     f0: u8, f1: u8, f2: u8, f3: u8, f4: u8, f5: u8, f6: u8, f7: u8, f8: u8, f9: u8, f10: u8, f11: u8, f12: u8, f13: u8, f14: u8, f15: u8,
/// #     f16: u8, f17: u8, f18: u8, f19: u8, f20: u8, f21: u8, f22: u8, f23: u8, f24: u8, f25: u8, f26: u8, f27: u8, f28: u8, f29: u8, f30: u8, f31: u8,
/// #     f32: u8, f33: u8, f34: u8, f35: u8, f36: u8, f37: u8, f38: u8, f39: u8, f40: u8, f41: u8, f42: u8, f43: u8, f44: u8, f45: u8, f46: u8, f47: u8,
/// #     f48: u8, f49: u8, f50: u8, f51: u8, f52: u8, f53: u8, f54: u8, f55: u8, f56: u8, f57: u8, f58: u8, f59: u8, f60: u8, f61: u8, f62: u8, f63: u8,
/// #     f64: u8, f65: u8, f66: u8, f67: u8, f68: u8, f69: u8, f70: u8, f71: u8, f72: u8, f73: u8, f74: u8, f75: u8, f76: u8, f77: u8, f78: u8, f79: u8,
/// #     f80: u8, f81: u8, f82: u8, f83: u8, f84: u8, f85: u8, f86: u8, f87: u8, f88: u8, f89: u8, f90: u8, f91: u8, f92: u8, f93: u8, f94: u8, f95: u8,
/// #     f96: u8, f97: u8, f98: u8, f99: u8, f100: u8, f101: u8, f102: u8, f103: u8, f104: u8, f105: u8, f106: u8, f107: u8, f108: u8, f109: u8, f110: u8, f111: u8,
/// #     f112: u8, f113: u8, f114: u8, f115: u8, f116: u8, f117: u8, f118: u8, f119: u8, f120: u8, f121: u8, f122: u8, f123: u8, f124: u8, f125: u8, f126: u8, f127: u8,
/// #     f128: u8, f129: u8, f130: u8, f131: u8, f132: u8, f133: u8, f134: u8, f135: u8, f136: u8, f137: u8, f138: u8, f139: u8, f140: u8, f141: u8, f142: u8, f143: u8,
/// #     f144: u8, f145: u8, f146: u8, f147: u8, f148: u8, f149: u8, f150: u8, f151: u8, f152: u8, f153: u8, f154: u8, f155: u8, f156: u8, f157: u8, f158: u8, f159: u8,
/// #     f160: u8, f161: u8, f162: u8, f163: u8, f164: u8, f165: u8, f166: u8, f167: u8, f168: u8, f169: u8, f170: u8, f171: u8, f172: u8, f173: u8, f174: u8, f175: u8,
/// #     f176: u8, f177: u8, f178: u8, f179: u8, f180: u8, f181: u8, f182: u8, f183: u8, f184: u8, f185: u8, f186: u8, f187: u8, f188: u8, f189: u8, f190: u8, f191: u8,
/// #     f192: u8, f193: u8, f194: u8, f195: u8, f196: u8, f197: u8, f198: u8, f199: u8, f200: u8, f201: u8, f202: u8, f203: u8, f204: u8, f205: u8, f206: u8, f207: u8,
/// #     f208: u8, f209: u8, f210: u8, f211: u8, f212: u8, f213: u8, f214: u8, f215: u8, f216: u8, f217: u8, f218: u8, f219: u8, f220: u8, f221: u8, f222: u8, f223: u8,
/// #     f224: u8, f225: u8, f226: u8, f227: u8, f228: u8, f229: u8, f230: u8, f231: u8, f232: u8, f233: u8, f234: u8, f235: u8, f236: u8, f237: u8, f238: u8, f239: u8,
/// #     f240: u8, f241: u8, f242: u8, f243: u8, f244: u8, f245: u8, f246: u8, f247: u8, f248: u8, f249: u8, f250: u8, f251: u8, f252: u8, f253: u8, f254: u8, f255: u8,
/// # }
/// loggable_struct!(Wide {
///     f0, f1, f2, f3, f4, f5, f6, f7, f8, f9, f10, f11, f12, f13, f14, f15,
///     f16, f17, f18, f19, f20, f21, f22, f23, f24, f25, f26, f27, f28, f29, f30, f31,
///     f32, f33, f34, f35, f36, f37, f38, f39, f40, f41, f42, f43, f44, f45, f46, f47,
///     f48, f49, f50, f51, f52, f53, f54, f55, f56, f57, f58, f59, f60, f61, f62, f63,
///     f64, f65, f66, f67, f68, f69, f70, f71, f72, f73, f74, f75, f76, f77, f78, f79,
///     f80, f81, f82, f83, f84, f85, f86, f87, f88, f89, f90, f91, f92, f93, f94, f95,
///     f96, f97, f98, f99, f100, f101, f102, f103, f104, f105, f106, f107, f108, f109, f110, f111,
///     f112, f113, f114, f115, f116, f117, f118, f119, f120, f121, f122, f123, f124, f125, f126, f127,
///     f128, f129, f130, f131, f132, f133, f134, f135, f136, f137, f138, f139, f140, f141, f142, f143,
///     f144, f145, f146, f147, f148, f149, f150, f151, f152, f153, f154, f155, f156, f157, f158, f159,
///     f160, f161, f162, f163, f164, f165, f166, f167, f168, f169, f170, f171, f172, f173, f174, f175,
///     f176, f177, f178, f179, f180, f181, f182, f183, f184, f185, f186, f187, f188, f189, f190, f191,
///     f192, f193, f194, f195, f196, f197, f198, f199, f200, f201, f202, f203, f204, f205, f206, f207,
///     f208, f209, f210, f211, f212, f213, f214, f215, f216, f217, f218, f219, f220, f221, f222, f223,
///     f224, f225, f226, f227, f228, f229, f230, f231, f232, f233, f234, f235, f236, f237, f238, f239,
///     f240, f241, f242, f243, f244, f245, f246, f247, f248, f249, f250, f251, f252, f253, f254, f255,
/// });
/// ```
#[macro_export]
macro_rules! loggable_struct {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        const _: () = ::std::assert!(
            $crate::__count_args!($($field),*) <= 255,
            "too many fields for one struct"
        );

        impl $crate::Loggable for $ty {
            fn tag(&self) -> u8 {
                $crate::loggable::tag::STRUCT
            }

            fn encoded_len(&self) -> usize {
                $crate::loggable::str16_len(stringify!($ty))
                    + 1
                    $(
                        + $crate::loggable::str16_len(stringify!($field))
                        + $crate::loggable::tagged_len(&self.$field)
                    )*
            }

            fn encode(&self, out: &mut Vec<u8>) {
                $crate::loggable::encode_str16(stringify!($ty), out);
                out.push($crate::__count_args!($($field),*) as u8);
                $(
                    $crate::loggable::encode_str16(stringify!($field), out);
                    $crate::loggable::encode_tagged(&self.$field, out);
                )*
            }
        }
    };
}

/// Implements [`Loggable`] for an enum whose variants carry no data.
///
/// Every variant must be listed; the generated `match` is exhaustive.
///
/// ```
/// use binlog::loggable_enum;
///
/// enum Phase {
///     Startup,
///     Running,
/// }
///
/// loggable_enum!(Phase { Startup, Running });
/// ```
#[macro_export]
macro_rules! loggable_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $ty {
            #[doc(hidden)]
            fn __binlog_variant_name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)+
                }
            }
        }

        impl $crate::Loggable for $ty {
            fn tag(&self) -> u8 {
                $crate::loggable::tag::ENUM
            }

            fn encoded_len(&self) -> usize {
                $crate::loggable::str16_len(stringify!($ty))
                    + $crate::loggable::str16_len(self.__binlog_variant_name())
            }

            fn encode(&self, out: &mut Vec<u8>) {
                $crate::loggable::encode_str16(stringify!($ty), out);
                $crate::loggable::encode_str16(self.__binlog_variant_name(), out);
            }
        }
    };
}
