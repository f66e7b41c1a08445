//! Panic reporting for batch runs.
//!
//! A panic inside the pipeline aborts the invocation, so the hook's job is
//! to leave a structured trace of it before the default hook prints.

use std::any::Any;
use std::panic::{self, PanicHookInfo};
use std::thread;

use metrics::counter;
use once_cell::sync::OnceCell;
use tracing::{debug, error};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Text of a panic payload, for the two payload types `panic!` produces.
pub fn payload_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<opaque panic payload>"
    }
}

fn location(info: &PanicHookInfo<'_>) -> String {
    info.location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "<unknown>".to_owned())
}

/// Log panics as errors and count them in `analitica_panics_total`.
/// The previously installed hook still runs afterwards.
pub fn install_hook() {
    if INSTALLED.set(()).is_err() {
        return;
    }

    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let current = thread::current();
        let thread_name = current.name().unwrap_or("<unnamed>").to_owned();
        let message = payload_text(info.payload());

        error!(
            thread = %thread_name,
            location = %location(info),
            payload = message,
            "analitica panicked"
        );
        counter!("analitica_panics_total", "thread" => thread_name)
            .increment(1);

        previous(info);
    }));

    debug!("panic hook installed");
}
