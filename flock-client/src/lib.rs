mod client;
pub use client::{broadcast, call, connect, CallError, Client};
