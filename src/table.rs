//! Fixed-capacity open-addressing aggregate store.
//!
//! One table serves as each worker's accumulator during the scan phase and
//! as the final merged store afterwards. Collisions resolve by double
//! hashing with bounded linear stepping: each step probes one slot from
//! each of two independent probe sequences, which roughly doubles the
//! usable sequence length of plain linear probing for the same step
//! budget. The table never resizes; running out of slots is fatal.

use std::hash::Hasher;

use rustc_hash::FxHasher;

use crate::error::Error;
use crate::measurement::Measurement;

/// Comfortably above the few hundred to few thousand distinct names the
/// workload is expected to carry.
pub const DEFAULT_CAPACITY: usize = 4096;
pub const DEFAULT_SEED_1: u64 = 0xb00b_1350;
pub const DEFAULT_SEED_2: u64 = 0xcafe_beef;

#[derive(Clone, Copy, Debug)]
pub struct TableConfig {
    /// Slot count; must be a nonzero power of two.
    pub capacity: usize,
    pub seed1: u64,
    pub seed2: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            seed1: DEFAULT_SEED_1,
            seed2: DEFAULT_SEED_2,
        }
    }
}

/// Running aggregate for one distinct name. `count == 0` marks an empty
/// slot; an occupied slot always satisfies `min <= max`.
#[derive(Clone, Copy, Debug)]
pub struct CityAggregate<'a> {
    pub name: &'a [u8],
    pub min: Measurement,
    pub max: Measurement,
    pub sum: i64,
    pub count: u64,
}

impl<'a> CityAggregate<'a> {
    const EMPTY: CityAggregate<'static> = CityAggregate {
        name: &[],
        min: 0,
        max: 0,
        sum: 0,
        count: 0,
    };

    fn first(name: &'a [u8], value: Measurement) -> Self {
        Self {
            name,
            min: value,
            max: value,
            sum: i64::from(value),
            count: 1,
        }
    }
}

pub struct AggregateTable<'a> {
    slots: Box<[CityAggregate<'a>]>,
    mask: usize,
    seed1: u64,
    seed2: u64,
    /// Worst probe distance seen so far; surfaced through the coordinator
    /// rather than a process-wide counter.
    max_probe: usize,
}

impl<'a> AggregateTable<'a> {
    pub fn new(config: &TableConfig) -> Result<Self, Error> {
        if !config.capacity.is_power_of_two() {
            return Err(Error::BadCapacity {
                capacity: config.capacity,
            });
        }
        Ok(Self {
            slots: vec![CityAggregate::EMPTY; config.capacity].into_boxed_slice(),
            mask: config.capacity - 1,
            seed1: config.seed1,
            seed2: config.seed2,
            max_probe: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    pub fn max_probe(&self) -> usize {
        self.max_probe
    }

    /// Accumulates one raw measurement for `name`.
    pub fn insert(&mut self, name: &'a [u8], value: Measurement) -> Result<(), Error> {
        let idx = self.find_slot(name)?;
        let slot = &mut self.slots[idx];
        if slot.count == 0 {
            *slot = CityAggregate::first(name, value);
        } else {
            slot.min = slot.min.min(value);
            slot.max = slot.max.max(value);
            slot.sum += i64::from(value);
            slot.count += 1;
        }
        Ok(())
    }

    /// Folds a whole aggregate in, combining both sides' extrema and adding
    /// sums and counts. Used when one worker's table is merged into another.
    pub fn merge(&mut self, other: &CityAggregate<'a>) -> Result<(), Error> {
        let idx = self.find_slot(other.name)?;
        let slot = &mut self.slots[idx];
        if slot.count == 0 {
            *slot = *other;
        } else {
            slot.min = slot.min.min(other.min);
            slot.max = slot.max.max(other.max);
            slot.sum += other.sum;
            slot.count += other.count;
        }
        Ok(())
    }

    /// Occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &CityAggregate<'a>> {
        self.slots.iter().filter(|slot| slot.count > 0)
    }

    /// Slot holding `name`, or the first empty slot on its probe sequence.
    fn find_slot(&mut self, name: &[u8]) -> Result<usize, Error> {
        let h1 = seeded_hash(self.seed1, name) as usize;
        let h2 = seeded_hash(self.seed2, name) as usize;
        for step in 0..=self.mask {
            for idx in [h1.wrapping_add(step) & self.mask, h2.wrapping_add(step) & self.mask] {
                let slot = &self.slots[idx];
                if slot.count == 0 || slot.name == name {
                    if step > self.max_probe {
                        self.max_probe = step;
                    }
                    return Ok(idx);
                }
            }
        }
        Err(Error::TableFull {
            capacity: self.capacity(),
        })
    }
}

fn seeded_hash(seed: u64, bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u64(seed);
    hasher.write(bytes);
    hasher.finish()
}
