//! Database entities

pub mod environment;
pub mod settings;

pub use environment::Entity as Environment;
pub use settings::Entity as Settings;

pub mod prelude {
    pub use super::environment::Entity as Environment;
    pub use super::settings::Entity as Settings;
}
