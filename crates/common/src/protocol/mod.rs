pub mod live_event;
pub mod stomp;
