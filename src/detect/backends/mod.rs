mod hivis;
mod stub;

pub use hivis::HiVisBackend;
pub use stub::StubBackend;
