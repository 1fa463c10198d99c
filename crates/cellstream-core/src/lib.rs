pub mod background;
pub mod consts;
pub mod control;
pub mod error;
pub mod frame;
pub mod io;
pub mod pipeline;
pub mod segment;
pub mod track;
pub mod traces;
