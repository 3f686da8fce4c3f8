pub mod id;
pub mod post;

pub use id::PrefixedId;
pub use post::Post;
