//! Connection-scoped state: the session record and the serialized writer

mod session;
mod writer;

pub use session::{Session, SessionState};
pub use writer::FrameWriter;
