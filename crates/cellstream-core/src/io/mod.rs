pub mod npy;
pub mod source;
pub mod traces;

pub use npy::{read_header, read_stack, write_stack, NpyElement, NpyHeader, NpyStack, NpyStackMut};
pub use source::{stack_path, ChannelSource, NpyDirSource};
pub use traces::{read_traces, write_traces};
