// Engine logging. The first argument names the component, which becomes the target suffix:
// `vdebug!(plan, delta, "...")` logs under `windowlist::plan`. Without the `tracing` feature the
// arguments are not evaluated.

#[cfg(feature = "tracing")]
macro_rules! vlog {
    ($level:ident, $component:ident, $($tt:tt)*) => {
        tracing::$level!(target: concat!("windowlist::", stringify!($component)), $($tt)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! vlog {
    ($($tt:tt)*) => {};
}

macro_rules! vtrace {
    ($component:ident, $($tt:tt)*) => {
        vlog!(trace, $component, $($tt)*)
    };
}

macro_rules! vdebug {
    ($component:ident, $($tt:tt)*) => {
        vlog!(debug, $component, $($tt)*)
    };
}

macro_rules! vwarn {
    ($component:ident, $($tt:tt)*) => {
        vlog!(warn, $component, $($tt)*)
    };
}
