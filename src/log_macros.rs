/// Format a line and hand it to the `output` method of a [`crate::RppalSl030Log`]
#[macro_export]
macro_rules! output {
    ($log:expr, $($arg:tt)+) => {
        $log.output(format_args!($($arg)+))
    };
}

/// Format a line and hand it to the `warning` method of a [`crate::RppalSl030Log`]
#[macro_export]
macro_rules! warning {
    ($log:expr, $($arg:tt)+) => {
        $log.warning(format_args!($($arg)+))
    };
}

/// Format a line and hand it to the `error` method of a [`crate::RppalSl030Log`]
#[macro_export]
macro_rules! error {
    ($log:expr, $($arg:tt)+) => {
        $log.error(format_args!($($arg)+))
    };
}
