#![no_std]

//! Wire level pieces of the LEGO Wireless Protocol (LWP3) shared by anything
//! that needs to talk to a hub: command frame encoding, notification decoding
//! and the physical value types carried inside those frames.

pub mod frame;
pub mod notification;
pub mod physical;
