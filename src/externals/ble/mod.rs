pub mod central;
pub mod transport;

#[cfg(test)]
pub mod mock;
