use indexmap::{IndexMap, IndexSet};

use crate::dao::models::{HqEntity, RegionEntity};

/// Point in a world.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    /// East/west axis.
    pub x: f64,
    /// Height.
    pub y: f64,
    /// North/south axis.
    pub z: f64,
}

impl Vec3 {
    /// Build a point from its coordinates.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Column of 16x16 blocks a point falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPos {
    /// Chunk column on the x axis.
    pub x: i32,
    /// Chunk column on the z axis.
    pub z: i32,
}

impl ChunkPos {
    /// Chunk containing `point`.
    pub fn of(point: Vec3) -> Self {
        Self {
            x: block_to_chunk(point.x),
            z: block_to_chunk(point.z),
        }
    }
}

fn block_to_chunk(coordinate: f64) -> i32 {
    (coordinate.floor() as i32) >> 4
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    min: Vec3,
    max: Vec3,
}

impl Region {
    /// Build a box from any two opposite corners.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Lowest corner.
    pub fn min(&self) -> Vec3 {
        self.min
    }

    /// Highest corner.
    pub fn max(&self) -> Vec3 {
        self.max
    }

    /// Whether `point` lies strictly inside the box.
    pub fn contains(&self, point: Vec3) -> bool {
        point.x > self.min.x
            && point.x < self.max.x
            && point.y > self.min.y
            && point.y < self.max.y
            && point.z > self.min.z
            && point.z < self.max.z
    }

    /// Whether the two boxes share any volume.
    pub fn intersects(&self, other: &Region) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
            && self.min.z < other.max.z
            && other.min.z < self.max.z
    }

    /// Every chunk column the box overlaps.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkPos> + use<> {
        let (low, high) = (ChunkPos::of(self.min), ChunkPos::of(self.max));
        (low.x..=high.x).flat_map(move |x| (low.z..=high.z).map(move |z| ChunkPos { x, z }))
    }
}

impl From<RegionEntity> for Region {
    fn from(value: RegionEntity) -> Self {
        let [ax, ay, az] = value.min;
        let [bx, by, bz] = value.max;
        Region::new(Vec3::new(ax, ay, az), Vec3::new(bx, by, bz))
    }
}

impl From<&Region> for RegionEntity {
    fn from(value: &Region) -> Self {
        Self {
            min: [value.min.x, value.min.y, value.min.z],
            max: [value.max.x, value.max.y, value.max.z],
        }
    }
}

/// Claimed land of a team: world name to the boxes claimed inside it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Territory {
    regions: IndexMap<String, Vec<Region>>,
}

impl Territory {
    /// Add `region` to the claims in `world`.
    pub fn claim(&mut self, world: &str, region: Region) {
        self.regions.entry(world.to_owned()).or_default().push(region);
    }

    /// Claims in `world`, empty when none.
    pub fn regions(&self, world: &str) -> &[Region] {
        self.regions.get(world).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether any claim in `world` contains `point`.
    pub fn contains(&self, world: &str, point: Vec3) -> bool {
        self.regions(world).iter().any(|region| region.contains(point))
    }

    /// Every `(world, chunk)` pair touched by the claims, deduplicated.
    pub fn chunks(&self) -> Vec<(String, ChunkPos)> {
        self.regions
            .iter()
            .flat_map(|(world, regions)| {
                regions
                    .iter()
                    .flat_map(Region::chunks)
                    .map(move |chunk| (world.clone(), chunk))
            })
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Whether nothing is claimed.
    pub fn is_empty(&self) -> bool {
        self.regions.values().all(Vec::is_empty)
    }
}

impl From<IndexMap<String, Vec<RegionEntity>>> for Territory {
    fn from(value: IndexMap<String, Vec<RegionEntity>>) -> Self {
        Self {
            regions: value
                .into_iter()
                .map(|(world, regions)| (world, regions.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }
}

impl From<&Territory> for IndexMap<String, Vec<RegionEntity>> {
    fn from(value: &Territory) -> Self {
        value
            .regions
            .iter()
            .map(|(world, regions)| (world.clone(), regions.iter().map(Into::into).collect()))
            .collect()
    }
}

/// Team home.
#[derive(Debug, Clone, PartialEq)]
pub struct Hq {
    /// World the home lives in.
    pub world: String,
    /// Position inside the world.
    pub position: Vec3,
    /// Horizontal facing.
    pub yaw: f64,
    /// Vertical facing.
    pub pitch: f64,
}

impl From<HqEntity> for Hq {
    fn from(value: HqEntity) -> Self {
        let [x, y, z] = value.position;
        Self {
            world: value.world,
            position: Vec3::new(x, y, z),
            yaw: value.yaw,
            pitch: value.pitch,
        }
    }
}

impl From<&Hq> for HqEntity {
    fn from(value: &Hq) -> Self {
        Self {
            world: value.world.clone(),
            position: [value.position.x, value.position.y, value.position.z],
            yaw: value.yaw,
            pitch: value.pitch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_of_negative_coordinates_rounds_down() {
        assert_eq!(ChunkPos::of(Vec3::new(15.9, 0.0, 16.0)), ChunkPos { x: 0, z: 1 });
        assert_eq!(ChunkPos::of(Vec3::new(-0.5, 0.0, -17.0)), ChunkPos { x: -1, z: -2 });
    }

    #[test]
    fn region_contains_is_exclusive_of_the_faces() {
        let region = Region::new(Vec3::new(10.0, 0.0, 10.0), Vec3::new(0.0, 100.0, 0.0));
        assert!(region.contains(Vec3::new(5.0, 50.0, 5.0)));
        assert!(!region.contains(Vec3::new(0.0, 50.0, 5.0)));
        assert!(!region.contains(Vec3::new(5.0, 150.0, 5.0)));
    }

    #[test]
    fn touching_regions_do_not_intersect() {
        let a = Region::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 10.0, 10.0));
        let b = Region::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(20.0, 10.0, 10.0));
        let c = Region::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(15.0, 15.0, 15.0));
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(c.intersects(&b));
    }

    #[test]
    fn region_spanning_chunk_border_covers_both_chunks() {
        let region = Region::new(Vec3::new(8.0, 0.0, 0.0), Vec3::new(24.0, 10.0, 4.0));
        let chunks: Vec<ChunkPos> = region.chunks().collect();
        assert_eq!(chunks, vec![ChunkPos { x: 0, z: 0 }, ChunkPos { x: 1, z: 0 }]);
    }

    #[test]
    fn territory_is_scoped_per_world() {
        let mut territory = Territory::default();
        territory.claim(
            "overworld",
            Region::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 10.0, 10.0)),
        );
        let inside = Vec3::new(5.0, 5.0, 5.0);
        assert!(territory.contains("overworld", inside));
        assert!(!territory.contains("nether", inside));
        assert_eq!(territory.chunks(), vec![("overworld".to_owned(), ChunkPos { x: 0, z: 0 })]);
    }

    #[test]
    fn overlapping_claims_list_each_chunk_once_in_claim_order() {
        let mut territory = Territory::default();
        territory.claim(
            "overworld",
            Region::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(40.0, 10.0, 8.0)),
        );
        territory.claim(
            "overworld",
            Region::new(Vec3::new(20.0, 0.0, 0.0), Vec3::new(30.0, 10.0, 8.0)),
        );
        territory.claim(
            "nether",
            Region::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(8.0, 10.0, 8.0)),
        );

        let chunks = territory.chunks();
        assert_eq!(
            chunks,
            vec![
                ("overworld".to_owned(), ChunkPos { x: 0, z: 0 }),
                ("overworld".to_owned(), ChunkPos { x: 1, z: 0 }),
                ("overworld".to_owned(), ChunkPos { x: 2, z: 0 }),
                ("nether".to_owned(), ChunkPos { x: 0, z: 0 }),
            ]
        );
    }
}
