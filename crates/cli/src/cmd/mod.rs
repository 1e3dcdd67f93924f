mod compile;
mod link;
mod stdlib;

pub use compile::cmd_compile;
pub use link::cmd_link;
pub use stdlib::{cmd_stdlib_list, cmd_stdlib_package};
