use crate::proto::BlockState;
use bevy_math::IVec2;
use rustc_hash::FxHashMap;

const SECTION_SIZE: usize = 16;
const SECTION_VOLUME: usize = SECTION_SIZE * SECTION_SIZE * SECTION_SIZE;

/// One 16³ cube of chunk palette ids. Stays a single value until a second id is written.
#[derive(Debug, Clone)]
enum Section {
    Homogeneous(u16),
    Heterogeneous {
        cube: Box<[u16; SECTION_VOLUME]>,
        counts: FxHashMap<u16, u16>,
    },
}

impl Section {
    #[inline]
    fn index(x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < SECTION_SIZE);
        debug_assert!(y < SECTION_SIZE);
        debug_assert!(z < SECTION_SIZE);
        (y * SECTION_SIZE + z) * SECTION_SIZE + x
    }

    fn get(&self, x: usize, y: usize, z: usize) -> u16 {
        match self {
            Section::Homogeneous(id) => *id,
            Section::Heterogeneous { cube, .. } => cube[Self::index(x, y, z)],
        }
    }

    /// Returns the previous id.
    fn set(&mut self, x: usize, y: usize, z: usize, id: u16) -> u16 {
        match self {
            Section::Homogeneous(original) => {
                let original = *original;
                if id != original {
                    let mut cube = Box::new([original; SECTION_VOLUME]);
                    cube[Self::index(x, y, z)] = id;
                    let mut counts = FxHashMap::default();
                    counts.insert(original, SECTION_VOLUME as u16 - 1);
                    counts.insert(id, 1);
                    *self = Section::Heterogeneous { cube, counts };
                }
                original
            }
            Section::Heterogeneous { cube, counts } => {
                let slot = &mut cube[Self::index(x, y, z)];
                let original = *slot;
                if original == id {
                    return original;
                }
                *slot = id;
                if let Some(count) = counts.get_mut(&original) {
                    *count -= 1;
                    if *count == 0 {
                        counts.remove(&original);
                    }
                }
                *counts.entry(id).or_insert(0) += 1;
                if counts.len() == 1 {
                    *self = Section::Homogeneous(id);
                }
                original
            }
        }
    }

    fn for_each_count(&self, mut f: impl FnMut(u16, usize)) {
        match self {
            Section::Homogeneous(id) => f(*id, SECTION_VOLUME),
            Section::Heterogeneous { counts, .. } => {
                for (id, count) in counts {
                    f(*id, *count as usize);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Heightmap {
    /// Highest non-air block.
    WorldSurfaceWg,
    /// Highest block that is neither air nor fluid.
    OceanFloorWg,
}

impl Heightmap {
    pub const ALL: [Heightmap; 2] = [Heightmap::WorldSurfaceWg, Heightmap::OceanFloorWg];

    pub fn name(self) -> &'static str {
        match self {
            Heightmap::WorldSurfaceWg => "WORLD_SURFACE_WG",
            Heightmap::OceanFloorWg => "OCEAN_FLOOR_WG",
        }
    }

    fn is_opaque(self, state: &BlockState) -> bool {
        match self {
            Heightmap::WorldSurfaceWg => !state.is_air(),
            Heightmap::OceanFloorWg => !state.is_air() && !state.is_fluid(),
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// A chunk column during generation: block storage plus the worldgen heightmaps. Positions are
/// world coordinates; x and z are taken modulo 16.
#[derive(Debug, Clone)]
pub struct ProtoChunk {
    pos: IVec2,
    min_y: i32,
    height: i32,
    palette: Vec<BlockState>,
    palette_index: FxHashMap<BlockState, u16>,
    sections: Vec<Section>,
    heightmaps: [[i32; SECTION_SIZE * SECTION_SIZE]; 2],
}

impl ProtoChunk {
    pub fn new(chunk_x: i32, chunk_z: i32, min_y: i32, height: i32) -> Self {
        let air = BlockState::air();
        let mut palette_index = FxHashMap::default();
        palette_index.insert(air.clone(), 0);
        let section_count = (height.max(0) as usize).div_ceil(SECTION_SIZE);
        Self {
            pos: IVec2::new(chunk_x, chunk_z),
            min_y,
            height,
            palette: vec![air],
            palette_index,
            sections: vec![Section::Homogeneous(0); section_count],
            heightmaps: [[min_y; SECTION_SIZE * SECTION_SIZE]; 2],
        }
    }

    /// Chunk coordinates.
    pub fn pos(&self) -> IVec2 {
        self.pos
    }

    pub fn min_block_x(&self) -> i32 {
        self.pos.x * SECTION_SIZE as i32
    }

    pub fn min_block_z(&self) -> i32 {
        self.pos.y * SECTION_SIZE as i32
    }

    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Exclusive.
    pub fn max_y(&self) -> i32 {
        self.min_y + self.height
    }

    pub fn is_outside_build_height(&self, y: i32) -> bool {
        y < self.min_y || y >= self.max_y()
    }

    pub fn palette(&self) -> &[BlockState] {
        &self.palette
    }

    #[inline]
    fn locate(&self, x: i32, y: i32, z: i32) -> (usize, usize, usize, usize) {
        let local_y = (y - self.min_y) as usize;
        (
            local_y / SECTION_SIZE,
            (x & 15) as usize,
            local_y % SECTION_SIZE,
            (z & 15) as usize,
        )
    }

    /// Air outside the build height.
    pub fn block_state(&self, x: i32, y: i32, z: i32) -> &BlockState {
        if self.is_outside_build_height(y) {
            return &self.palette[0];
        }
        let (section, x, y, z) = self.locate(x, y, z);
        &self.palette[self.sections[section].get(x, y, z) as usize]
    }

    /// Writes a block and keeps the heightmaps current. Returns the previous state, or `None`
    /// when `y` is outside the build height.
    pub fn set_block_state(&mut self, x: i32, y: i32, z: i32, state: &BlockState) -> Option<BlockState> {
        if self.is_outside_build_height(y) {
            return None;
        }
        let id = self.palette_id(state);
        let (section, local_x, local_y, local_z) = self.locate(x, y, z);
        let previous = self.sections[section].set(local_x, local_y, local_z, id);
        if previous != id {
            for heightmap in Heightmap::ALL {
                self.update_heightmap(heightmap, x, y, z, state);
            }
        }
        Some(self.palette[previous as usize].clone())
    }

    fn palette_id(&mut self, state: &BlockState) -> u16 {
        if let Some(id) = self.palette_index.get(state) {
            return *id;
        }
        let id = self.palette.len() as u16;
        self.palette.push(state.clone());
        self.palette_index.insert(state.clone(), id);
        id
    }

    #[inline]
    fn column(x: i32, z: i32) -> usize {
        ((z & 15) * 16 + (x & 15)) as usize
    }

    /// First free y above the highest matching block, `min_y` for an empty column.
    pub fn height_at(&self, heightmap: Heightmap, x: i32, z: i32) -> i32 {
        self.heightmaps[heightmap.slot()][Self::column(x, z)]
    }

    fn update_heightmap(&mut self, heightmap: Heightmap, x: i32, y: i32, z: i32, state: &BlockState) {
        let first_available = self.height_at(heightmap, x, z);
        if y <= first_available - 2 {
            return;
        }
        let column = Self::column(x, z);
        if heightmap.is_opaque(state) {
            if y >= first_available {
                self.heightmaps[heightmap.slot()][column] = y + 1;
            }
        } else if first_available - 1 == y {
            let mut top = self.min_y;
            for below in (self.min_y..y).rev() {
                if heightmap.is_opaque(self.block_state(x, below, z)) {
                    top = below + 1;
                    break;
                }
            }
            self.heightmaps[heightmap.slot()][column] = top;
        }
    }

    /// Block counts over the whole chunk, air included.
    pub fn histogram(&self) -> Vec<(&BlockState, usize)> {
        let mut counts = vec![0usize; self.palette.len()];
        for section in &self.sections {
            section.for_each_count(|id, count| counts[id as usize] += count);
        }
        // the last section may extend past max_y when height is not a multiple of 16
        let overflow = self.sections.len() * SECTION_VOLUME
            - self.height.max(0) as usize * SECTION_SIZE * SECTION_SIZE;
        counts[0] = counts[0].saturating_sub(overflow);
        self.palette
            .iter()
            .zip(counts)
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use crate::chunk::{Heightmap, ProtoChunk};
    use crate::proto::BlockState;

    #[test]
    fn blocks_round_trip_through_the_palette() {
        let mut chunk = ProtoChunk::new(2, -3, -64, 384);
        let stone = BlockState::new("stone");
        assert!(chunk.block_state(40, 10, -40).is_air());
        assert_eq!(chunk.set_block_state(40, 10, -40, &stone), Some(BlockState::air()));
        assert_eq!(chunk.block_state(40, 10, -40), &stone);
        assert_eq!(chunk.block_state(8, 10, 8), &stone);
        assert!(chunk.block_state(9, 10, 8).is_air());
        assert_eq!(chunk.set_block_state(0, 320, 0, &stone), None);
        assert_eq!(chunk.palette().len(), 2);
        assert_eq!(chunk.min_block_x(), 32);
        assert_eq!(chunk.min_block_z(), -48);
    }

    #[test]
    fn heightmaps_follow_writes() {
        let mut chunk = ProtoChunk::new(0, 0, -64, 384);
        assert_eq!(chunk.height_at(Heightmap::WorldSurfaceWg, 3, 4), -64);
        chunk.set_block_state(3, 50, 4, &BlockState::new("stone"));
        chunk.set_block_state(3, 62, 4, &BlockState::water());
        assert_eq!(chunk.height_at(Heightmap::WorldSurfaceWg, 3, 4), 63);
        assert_eq!(chunk.height_at(Heightmap::OceanFloorWg, 3, 4), 51);

        chunk.set_block_state(3, 62, 4, &BlockState::air());
        assert_eq!(chunk.height_at(Heightmap::WorldSurfaceWg, 3, 4), 51);
        chunk.set_block_state(3, 50, 4, &BlockState::air());
        assert_eq!(chunk.height_at(Heightmap::WorldSurfaceWg, 3, 4), -64);
    }

    #[test]
    fn sections_collapse_back_to_one_value() {
        let mut chunk = ProtoChunk::new(0, 0, 0, 16);
        let dirt = BlockState::new("dirt");
        for x in 0..16 {
            for y in 0..16 {
                for z in 0..16 {
                    chunk.set_block_state(x, y, z, &dirt);
                }
            }
        }
        assert_eq!(chunk.histogram(), vec![(&dirt, 4096)]);
        chunk.set_block_state(1, 1, 1, &BlockState::air());
        assert_eq!(chunk.histogram(), vec![(&BlockState::air(), 1), (&dirt, 4095)]);
    }

    #[test]
    fn histogram_ignores_padding_above_max_y() {
        let chunk = ProtoChunk::new(0, 0, 0, 20);
        assert_eq!(chunk.histogram(), vec![(&BlockState::air(), 20 * 256)]);
    }
}
