mod listener;
mod port_allocator;

pub use listener::*;
pub use port_allocator::*;
