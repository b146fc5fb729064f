//! Small shared helpers.

use std::borrow::Cow;
use std::time::Instant;

/// Logs the elapsed time of a scope when dropped.
///
/// ```ignore
/// let _timer = Timed::info("build topology");
/// // ... work ...
/// // logs "build topology: 12.345ms" at INFO when `_timer` goes out of scope
/// ```
pub struct Timed {
    name: Cow<'static, str>,
    start: Instant,
    level: log::Level,
}

impl Timed {
    /// Timer that logs at INFO level.
    pub fn info(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name.into(), log::Level::Info)
    }

    /// Timer that logs at DEBUG level.
    pub fn debug(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name.into(), log::Level::Debug)
    }

    fn new(name: Cow<'static, str>, level: log::Level) -> Self {
        log::trace!("{}...", name);
        Self {
            name,
            start: Instant::now(),
            level,
        }
    }
}

impl Drop for Timed {
    fn drop(&mut self) {
        log::log!(self.level, "{}: {:.3?}", self.name, self.start.elapsed());
    }
}
