pub mod adoption;
