#[cfg(test)]
mod connection;
#[cfg(test)]
mod utils;
