mod pipeline;
mod search;
pub(crate) mod support;
