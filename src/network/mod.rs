pub mod cipher;
pub mod codec;
pub mod opcodes;
pub mod packet;

pub use cipher::Cipher;
pub use codec::{read_frame, write_frame, FrameError};
pub use packet::{PacketReader, PacketWriter};
