pub mod notification;
pub mod read_state;

pub use self::notification::*;
pub use self::read_state::*;
