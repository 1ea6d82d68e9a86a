//! Indicator LED frames. Write-only; the cube never answers.

use serde::{Deserialize, Serialize};

use super::{duration_units, Encoded};

const CMD_TURN_OFF_ALL: u8 = 0x01;
const CMD_TURN_ON: u8 = 0x03;
const CMD_SCENARIO: u8 = 0x04;

/// The cube has a single LED, addressed as "1 light, id 1".
const LIGHT_COUNT: u8 = 0x01;
const LIGHT_ID: u8 = 0x01;

/// Rows carried by one scenario frame.
pub const OPERATIONS_PER_SCENARIO: usize = 29;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LightOperation {
    /// 0-2550 ms, 0 keeps the light on.
    pub duration_ms: u32,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl LightOperation {
    pub fn new(duration_ms: u32, red: u8, green: u8, blue: u8) -> Self {
        Self {
            duration_ms,
            red,
            green,
            blue,
        }
    }
}

/// What a scenario frame actually carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LightScenario {
    pub operations: Vec<LightOperation>,
    pub repeat_count: u8,
    /// 0 when the scenario repeats forever.
    pub total_duration_ms: u32,
}

pub struct LightSpec;

impl LightSpec {
    pub fn encode_turn_on(operation: &LightOperation) -> Encoded<LightOperation> {
        let units = duration_units(operation.duration_ms, 0);
        Encoded::new(
            vec![
                CMD_TURN_ON,
                units,
                LIGHT_COUNT,
                LIGHT_ID,
                operation.red,
                operation.green,
                operation.blue,
            ],
            LightOperation {
                duration_ms: u32::from(units) * 10,
                ..*operation
            },
        )
    }

    /// `repeat_count` 0 loops forever. Callers reject empty lists before
    /// getting here; an empty list still encodes a valid zero-row frame.
    pub fn encode_scenario(operations: &[LightOperation], repeat_count: u8) -> Encoded<LightScenario> {
        let operations = &operations[..operations.len().min(OPERATIONS_PER_SCENARIO)];
        let mut frame = Vec::with_capacity(3 + 6 * operations.len());
        frame.extend_from_slice(&[CMD_SCENARIO, repeat_count, operations.len() as u8]);

        let mut total_units = 0u32;
        let mut echoed = Vec::with_capacity(operations.len());
        for operation in operations {
            let units = duration_units(operation.duration_ms, 1);
            total_units += u32::from(units);
            frame.extend_from_slice(&[
                units,
                LIGHT_COUNT,
                LIGHT_ID,
                operation.red,
                operation.green,
                operation.blue,
            ]);
            echoed.push(LightOperation {
                duration_ms: u32::from(units) * 10,
                ..*operation
            });
        }

        Encoded::new(
            frame,
            LightScenario {
                operations: echoed,
                repeat_count,
                total_duration_ms: total_units * 10 * u32::from(repeat_count),
            },
        )
    }

    pub fn encode_turn_off() -> Vec<u8> {
        vec![CMD_TURN_OFF_ALL]
    }
}
