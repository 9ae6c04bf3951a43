mod common;
mod pets;
mod workflow;
