//! Binary data-plane formats spoken by the radio.
//!
//! - [`vita`]: the VITA-style packet envelope shared by every stream
//! - [`waterfall`]: the waterfall tile carried in a VITA payload

pub mod vita;
pub mod waterfall;

pub use vita::{ClassId, PacketClass, PacketHeader, PacketType, TsfType, TsiType, VitaPacket};
pub use waterfall::WaterfallTile;
