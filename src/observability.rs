use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("codecircle.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("codecircle.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("codecircle.client.request_duration_seconds");

pub(crate) static STREAM_BYTES: Counter = Counter::new("codecircle.stream.bytes");
pub(crate) static STREAM_FRAMES: Counter = Counter::new("codecircle.stream.frames");
pub(crate) static STREAM_DISCARDED_BYTES: Counter =
    Counter::new("codecircle.stream.discarded_bytes");
pub(crate) static STREAM_EVENTS: Counter = Counter::new("codecircle.stream.events");
pub(crate) static STREAM_UNRECOGNIZED: Counter = Counter::new("codecircle.stream.unrecognized");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("codecircle.stream.errors");
pub(crate) static STREAM_TTFB: Moments = Moments::new("codecircle.stream.ttfb_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("codecircle.stream.duration_seconds");

pub(crate) static SESSION_COMPLETED: Counter = Counter::new("codecircle.session.completed");
pub(crate) static SESSION_IMPLICIT_COMPLETIONS: Counter =
    Counter::new("codecircle.session.implicit_completions");
pub(crate) static SESSION_EMPTY: Counter = Counter::new("codecircle.session.empty");
pub(crate) static SESSION_CANCELLED: Counter = Counter::new("codecircle.session.cancelled");
pub(crate) static SESSION_ERRORED: Counter = Counter::new("codecircle.session.errored");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_FRAMES);
    collector.register_counter(&STREAM_DISCARDED_BYTES);
    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_UNRECOGNIZED);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_moments(&STREAM_TTFB);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&SESSION_COMPLETED);
    collector.register_counter(&SESSION_IMPLICIT_COMPLETIONS);
    collector.register_counter(&SESSION_EMPTY);
    collector.register_counter(&SESSION_CANCELLED);
    collector.register_counter(&SESSION_ERRORED);
}
