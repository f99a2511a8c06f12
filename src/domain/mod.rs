/// Domain layer - CSV model, sort keys, binary row layout and the reader/writer ports
/// This layer has no dependencies on outer layers

pub mod codec;
pub mod entities;
pub mod readers;
pub mod repositories;
pub mod table;
pub mod utils;

pub use codec::*;
pub use entities::*;
pub use readers::*;
pub use repositories::*;
pub use table::*;
pub use utils::*;
