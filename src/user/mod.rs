pub mod profile;

pub use profile::{ProfileAccrual, UserProfile};
