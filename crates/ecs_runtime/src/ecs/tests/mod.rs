//! Cross-module scenarios

mod hierarchy_scenes;
mod world_lifecycle;
