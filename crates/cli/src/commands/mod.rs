pub mod decompile;
pub mod find;
pub mod script;
pub mod settings;

pub use decompile::*;
pub use find::*;
pub use script::*;
pub use settings::*;
