/// The initialized context for a hook that needs the real symbol table.
///
/// Only `dlsym` and `dlvsym` can serve a call that arrives while the real
/// symbols are still being resolved on the same thread; every other hook
/// treats that as fatal.
macro_rules! hook_context {
    ($symbol:expr) => {
        match $crate::lifecycle::ensure_initialized() {
            Some(context) => context,
            None => $crate::lifecycle::fatal(&$crate::error::ShimError::Reentrant { symbol: $symbol }),
        }
    };
}

/// An exported GLX destruction hook: notify the script, then destroy.
macro_rules! destroy_hook {
    ($name:ident($target:ident: $ty:ty) => $real:ident) => {
        #[cfg_attr(not(test), no_mangle)]
        pub unsafe extern "C" fn $name(display: *mut $crate::x11::Display, $target: $ty) {
            let context = hook_context!(stringify!($name));
            $crate::interpose::destroy_with(
                context,
                context.reals().$real(),
                display,
                $target,
                $target as u64,
            )
        }
    };
}
