//! Image extender CLI - run an image's extension and graft its layer.

pub mod commands;
