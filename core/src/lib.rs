pub mod dispatch;
pub mod establish;
pub mod link;
pub mod network;
pub mod scanner;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
