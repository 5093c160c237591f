pub mod health;
pub use self::health::health;

pub mod login;
pub use self::login::login;

pub mod session;
pub use self::session::{logout, rotate_token};

pub mod user;
pub use self::user::current_user;
