// Copyright 2017 Lyndon Brown
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! Wire-level types and transport for the sound server native protocol.
//!
//! This crate has no opinion on mainloops, connection policy, or the shape of the public
//! client API — that lives in `pulse-client`. It only knows how to describe and frame the bytes
//! that cross the wire: sample specs, channel maps, volumes, property lists, tag-struct encoding,
//! frame descriptors, memory blocks, and the packet-stream/dispatcher pair built on top of them.

#![deny(bare_trait_objects)]

pub mod channelmap;
pub mod command;
pub mod def;
pub mod error;
pub mod frame;
pub mod iochannel;
pub mod memblock;
pub mod pdispatch;
pub mod proplist;
pub mod pstream;
pub mod sample;
pub mod tagstruct;
pub mod time;
pub mod volume;
