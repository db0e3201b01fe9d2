// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod buffer;

pub use self::buffer::Buffer;
