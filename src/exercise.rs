//! Operations of the durable-write exerciser.
//!
//! Each operation is one or more calls on the [`Client`] capability surface;
//! the looped variants exist for throughput measurements, not correctness.

use log::info;
use rand::RngCore;

use crate::client::{Client, DurabilityLevel, DurabilityRequirement};
use crate::{McError, Result};

/// Number of random payloads precomputed by `loop_bulk_setD`.
pub const BULK_PAYLOAD_COUNT: usize = 1000;
/// Size in bytes of each random payload.
pub const BULK_PAYLOAD_SIZE: usize = 500;

/// Iteration schedule of `loop_bulk_setD`.
///
/// When fewer operations than items are requested, a single pass strides
/// through the item range with step `items / operations` (integer division,
/// so a non-divisible range is under-covered). Otherwise the full range is
/// repeated `operations / items` times with stride 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    item_count: usize,
    iterations: usize,
    step: usize,
}

impl BatchPlan {
    /// Build the schedule for `item_count` items and `operations` writes.
    /// Both counts must be positive.
    pub fn new(item_count: usize, operations: usize) -> Result<BatchPlan> {
        if item_count == 0 || operations == 0 {
            return Err(McError::Argument(
                "item and operation counts must be positive".to_string(),
            ));
        }
        Ok(if operations < item_count {
            BatchPlan {
                item_count,
                iterations: 1,
                step: item_count / operations,
            }
        } else {
            BatchPlan {
                item_count,
                iterations: operations / item_count,
                step: 1,
            }
        })
    }

    /// Number of passes over the item range.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Stride through the item range within one pass.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Item indices written, in order, over all passes.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.iterations).flat_map(move |_| (0..self.item_count).step_by(self.step))
    }
}

/// Execute one exerciser operation against an established session.
///
/// `value` is the optional 7th positional argument; `extra` holds everything
/// after it (counts, durability level, timeout). Unknown operation names
/// yield [`McError::UnknownOperation`].
pub fn run_op(
    client: &mut dyn Client,
    op: &str,
    key: &str,
    value: Option<&str>,
    extra: &[String],
) -> Result<()> {
    match op {
        "get" => match client.get(key)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("Key not found"),
        },
        "set" => {
            let value = require_value(op, value)?;
            println!("{}", client.set(key, value.as_bytes())?);
        }
        "loop_set" => {
            let value = require_value(op, value)?;
            let count = parse_count(op, extra.first())?;
            for i in 0..count {
                let value = format!("{}_{}", value, i);
                println!("{}", client.set(key, value.as_bytes())?);
            }
        }
        "setD" => {
            let value = require_value(op, value)?;
            let level = parse_durability(extra.first().map(String::as_str))?;
            let timeout = parse_timeout(extra.get(1))?;
            let durability = DurabilityRequirement { level, timeout };
            println!("{}", client.set_durable(key, value.as_bytes(), durability)?);
        }
        "bulk_setD" => {
            let count = parse_count(op, extra.first())?;
            let level = parse_durability(extra.get(1).map(String::as_str))?;
            let durability = DurabilityRequirement {
                level,
                timeout: None,
            };
            let mut rng = rand::thread_rng();
            for i in 0..count {
                let key = format!("{}_{}", key, i);
                client.set_durable(&key, &random_payload(&mut rng), durability)?;
            }
        }
        "loop_setD" => {
            let value = require_value(op, value)?;
            let count = parse_count(op, extra.first())?;
            let level = parse_durability(extra.get(1).map(String::as_str))?;
            let durability = DurabilityRequirement {
                level,
                timeout: None,
            };
            for i in 0..count {
                let value = format!("{}_{}", value, i);
                client.set_durable(key, value.as_bytes(), durability)?;
            }
        }
        "loop_bulk_setD" => {
            let item_count = parse_count(op, extra.first())?;
            let operations = parse_count(op, extra.get(1))?;
            let level = parse_durability(extra.get(2).map(String::as_str))?;
            let durability = DurabilityRequirement {
                level,
                timeout: None,
            };

            // Pre-compute a "reasonable" number of random values.
            let mut rng = rand::thread_rng();
            let payloads: Vec<Vec<u8>> = (0..BULK_PAYLOAD_COUNT)
                .map(|_| random_payload(&mut rng))
                .collect();

            let plan = BatchPlan::new(item_count, operations)?;
            info!(
                "loop_bulk_setD: {} iterations, step {}",
                plan.iterations(),
                plan.step()
            );
            for index in plan.indices() {
                let key = format!("{}_{}", key, index);
                client.set_durable(&key, &payloads[index % BULK_PAYLOAD_COUNT], durability)?;
            }
        }
        "add" => {
            let value = require_value(op, value)?;
            println!("{}", client.add(key, value.as_bytes())?);
        }
        "addD" => {
            let value = require_value(op, value)?;
            let durability = DurabilityRequirement::default();
            println!("{}", client.add_durable(key, value.as_bytes(), durability)?);
        }
        "replace" => {
            let value = require_value(op, value)?;
            println!("{}", client.replace(key, value.as_bytes())?);
        }
        "replaceD" => {
            let value = require_value(op, value)?;
            let durability = DurabilityRequirement::default();
            println!(
                "{}",
                client.replace_durable(key, value.as_bytes(), durability)?
            );
        }
        "delete" => {
            println!("{}", client.delete(key)?);
        }
        "deleteD" => {
            println!(
                "{}",
                client.delete_durable(key, DurabilityRequirement::default())?
            );
        }
        _ => return Err(McError::UnknownOperation(op.to_string())),
    }
    Ok(())
}

fn require_value<'a>(op: &str, value: Option<&'a str>) -> Result<&'a str> {
    value.ok_or_else(|| McError::Argument(format!("op '{}' requires a value argument", op)))
}

fn parse_count(op: &str, arg: Option<&String>) -> Result<usize> {
    let arg =
        arg.ok_or_else(|| McError::Argument(format!("op '{}' requires a count argument", op)))?;
    arg.parse()
        .map_err(|_| McError::Argument(format!("invalid count '{}'", arg)))
}

/// Parse a raw durability level argument, defaulting to majority when absent.
pub fn parse_durability(arg: Option<&str>) -> Result<DurabilityLevel> {
    match arg {
        Some(raw) => {
            let raw: u8 = raw
                .parse()
                .map_err(|_| McError::Argument(format!("invalid durability level '{}'", raw)))?;
            DurabilityLevel::from_raw(raw)
        }
        None => Ok(DurabilityLevel::default()),
    }
}

fn parse_timeout(arg: Option<&String>) -> Result<Option<u64>> {
    match arg {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| McError::Argument(format!("invalid timeout '{}'", raw))),
        None => Ok(None),
    }
}

fn random_payload(rng: &mut impl RngCore) -> Vec<u8> {
    let mut buf = vec![0u8; BULK_PAYLOAD_SIZE];
    rng.fill_bytes(&mut buf);
    buf
}
