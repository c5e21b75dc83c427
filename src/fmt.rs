//! Logging shim dispatching to `defmt` or `log` depending on the
//! enabled feature, and compiling to nothing when neither is selected.
//!
//! Only foreground code logs; interrupt handlers never do. Call sites
//! stick to plain `{}` placeholders and integer arguments so the same
//! format string works under both backends.

macro_rules! link_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt-0-3")]
        ::defmt::debug!($($arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt-0-3")))]
        ::log::debug!($($arg)*);
        #[cfg(not(any(feature = "defmt-0-3", feature = "log")))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

macro_rules! link_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt-0-3")]
        ::defmt::warn!($($arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt-0-3")))]
        ::log::warn!($($arg)*);
        #[cfg(not(any(feature = "defmt-0-3", feature = "log")))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

pub(crate) use link_debug;
pub(crate) use link_warn;
