// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on index entities.

pub mod abbreviations;
pub mod conversations;
pub mod turns;
