use spin::{Mutex, Once};

/// Console backend. On hardware this is the UART writer; the test harness
/// installs a shim. Unset means output is dropped.
pub type Sink = fn(core::fmt::Arguments);

static SINK: Once<Sink> = Once::new();
static PRINTK_LOCK: Mutex<()> = Mutex::new(());

/// Install the console sink. The first call wins.
pub fn set_sink(sink: Sink) {
    SINK.call_once(|| sink);
}

pub fn _printk(args: core::fmt::Arguments) {
    if let Some(sink) = SINK.get() {
        let _guard = PRINTK_LOCK.lock();
        sink(args);
    }
}

#[macro_export]
macro_rules! printk {
    ($fmt:expr) => { $crate::printk::_printk(format_args!($fmt)) };
    ($fmt:expr, $($arg:tt)*) => { $crate::printk::_printk(format_args!($fmt, $($arg)*)) };
}
