//! World coordinates, chunk columns, and axis-aligned claim bounds.
//!
//! The host world is partitioned into 16x16 chunk columns. A block at
//! `(x, y, z)` lives in chunk `(x >> 4, z >> 4)` at in-chunk offset
//! `(x & 15, z & 15)`. Arithmetic shift makes negative coordinates floor
//! toward negative infinity, so block `-1` lands in chunk `-1` at offset 15.

use serde::{Deserialize, Serialize};

/// Bits shifted off a block coordinate to get its chunk coordinate.
pub const CHUNK_SHIFT: u32 = 4;

/// Mask selecting the in-chunk offset of a block coordinate.
pub const CHUNK_MASK: i32 = 15;

/// Internal numeric identifier of a world (dimension) on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub u16);

impl core::fmt::Display for WorldId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Convert a block coordinate to its chunk coordinate.
pub const fn to_chunk_coord(block: i32) -> i32 {
    block >> CHUNK_SHIFT
}

/// Offset of a block coordinate within its chunk (0..=15).
pub const fn chunk_offset(block: i32) -> u8 {
    // Masked to 0..=15, always fits.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let offset = (block & CHUNK_MASK) as u8;
    offset
}

/// A single block position in a specific world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    /// World the block belongs to.
    pub world: WorldId,
    /// East-west coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
    /// North-south coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Create a block position.
    pub const fn new(world: WorldId, x: i32, y: i32, z: i32) -> Self {
        Self { world, x, y, z }
    }

    /// The chunk column containing this block.
    pub const fn chunk(&self) -> ChunkPos {
        ChunkPos {
            world: self.world,
            x: to_chunk_coord(self.x),
            z: to_chunk_coord(self.z),
        }
    }
}

impl core::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{},{},{}", self.world, self.x, self.y, self.z)
    }
}

/// A 16x16 chunk column in a specific world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    /// World the chunk belongs to.
    pub world: WorldId,
    /// Chunk x coordinate (block x >> 4).
    pub x: i32,
    /// Chunk z coordinate (block z >> 4).
    pub z: i32,
}

impl ChunkPos {
    /// Create a chunk position.
    pub const fn new(world: WorldId, x: i32, z: i32) -> Self {
        Self { world, x, z }
    }
}

/// An inclusive axis-aligned box of blocks inside one world.
///
/// A single-block reinforcement is the 1x1x1 box returned by
/// [`Bounds::block`]. Bounds built with [`Bounds::new`] are always
/// normalized (`min <= max` on every axis); bounds deserialized from the
/// wire may not be, and must be checked with [`Bounds::is_normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    /// World the box lies in.
    pub world: WorldId,
    /// Lowest x coordinate (inclusive).
    pub min_x: i32,
    /// Lowest y coordinate (inclusive).
    pub min_y: i32,
    /// Lowest z coordinate (inclusive).
    pub min_z: i32,
    /// Highest x coordinate (inclusive).
    pub max_x: i32,
    /// Highest y coordinate (inclusive).
    pub max_y: i32,
    /// Highest z coordinate (inclusive).
    pub max_z: i32,
}

impl Bounds {
    /// Build normalized bounds from two opposite corners given as `(x, y, z)`.
    pub fn new(world: WorldId, a: (i32, i32, i32), b: (i32, i32, i32)) -> Self {
        Self {
            world,
            min_x: a.0.min(b.0),
            min_y: a.1.min(b.1),
            min_z: a.2.min(b.2),
            max_x: a.0.max(b.0),
            max_y: a.1.max(b.1),
            max_z: a.2.max(b.2),
        }
    }

    /// The 1x1x1 box around a single block.
    pub const fn block(pos: BlockPos) -> Self {
        Self {
            world: pos.world,
            min_x: pos.x,
            min_y: pos.y,
            min_z: pos.z,
            max_x: pos.x,
            max_y: pos.y,
            max_z: pos.z,
        }
    }

    /// Whether `min <= max` holds on every axis.
    pub const fn is_normalized(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y && self.min_z <= self.max_z
    }

    /// Whether the box contains the given block.
    pub const fn contains(&self, pos: &BlockPos) -> bool {
        self.world.0 == pos.world.0
            && pos.x >= self.min_x
            && pos.x <= self.max_x
            && pos.y >= self.min_y
            && pos.y <= self.max_y
            && pos.z >= self.min_z
            && pos.z <= self.max_z
    }

    /// Whether two boxes share at least one block.
    pub const fn intersects(&self, other: &Self) -> bool {
        self.world.0 == other.world.0
            && self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
            && self.min_z <= other.max_z
            && other.min_z <= self.max_z
    }

    /// Number of blocks spanned along x.
    pub fn extent_x(&self) -> u64 {
        span(self.min_x, self.max_x)
    }

    /// Number of blocks spanned along y.
    pub fn extent_y(&self) -> u64 {
        span(self.min_y, self.max_y)
    }

    /// Number of blocks spanned along z.
    pub fn extent_z(&self) -> u64 {
        span(self.min_z, self.max_z)
    }

    /// The lowest corner of the box.
    pub const fn min_corner(&self) -> BlockPos {
        BlockPos::new(self.world, self.min_x, self.min_y, self.min_z)
    }

    /// Every chunk column the box touches, in x-major order.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkPos> + use<> {
        let world = self.world;
        let (min_cz, max_cz) = (to_chunk_coord(self.min_z), to_chunk_coord(self.max_z));
        (to_chunk_coord(self.min_x)..=to_chunk_coord(self.max_x))
            .flat_map(move |cx| (min_cz..=max_cz).map(move |cz| ChunkPos::new(world, cx, cz)))
    }

    /// Whether the box touches the given chunk column.
    pub const fn touches_chunk(&self, chunk: &ChunkPos) -> bool {
        self.world.0 == chunk.world.0
            && to_chunk_coord(self.min_x) <= chunk.x
            && chunk.x <= to_chunk_coord(self.max_x)
            && to_chunk_coord(self.min_z) <= chunk.z
            && chunk.z <= to_chunk_coord(self.max_z)
    }
}

/// Inclusive span between two coordinates, zero when `max < min`.
fn span(min: i32, max: i32) -> u64 {
    let diff = i64::from(max).saturating_sub(i64::from(min));
    u64::try_from(diff).map_or(0, |d| d.saturating_add(1))
}
