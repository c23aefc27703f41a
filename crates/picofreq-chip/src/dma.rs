// SPDX-License-Identifier: AGPL-3.0-only

//! DMA controller dimensions.

/// Claimable DMA channels.
pub const NUM_CHANNELS: usize = 12;
