//! Order lifecycle: pure state machine, money arithmetic and the
//! transactional service that applies them.

pub mod lifecycle;
pub mod money;
pub mod service;
