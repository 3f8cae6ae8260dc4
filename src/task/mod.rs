// Task Module - what a dispatched task needs from an agent

pub mod types;


pub use types::{SecretRef, TaskParameter, TaskType, ValidationRequest};
