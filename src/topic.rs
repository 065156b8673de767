// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Topic hashing. A topic is the 64-bit WyHash v4 of a command's type name,
//! used both as the wire frame header and as the key into the handler
//! registry and routing filter. Must match the reference WyHash test
//! vectors exactly or peers built against a different hash will silently
//! fail to route to each other.

use wyhash::wyhash;

/// Hashes a command type name into its wire topic.
pub fn topic_of(type_name: &str) -> u64 {
    wyhash(type_name.as_bytes(), 0)
}
