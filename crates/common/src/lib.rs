// liveservice-common: STOMP framing and live event wire types

pub mod protocol;
