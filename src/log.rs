macro_rules! fatal {
    ($fmt:expr) => {
        (panic!(concat!("[FATAL] ", $fmt)))
    };
    ($fmt:expr, $($arg:tt)*) => {
        (panic!(concat!("[FATAL] ", $fmt), $($arg)*))
    };
}

use crate::TatamiError;
use tracing::error;

pub(crate) fn basic_error_handler(error: TatamiError) {
    error!("{}", error);
}
