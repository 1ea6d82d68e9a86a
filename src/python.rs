//! Python extension module `_core`.
//!
//! The async driver runs on a runtime owned by each `Cube` object; every
//! method blocks the calling Python thread (with the GIL released) until
//! the underlying operation is done.

use std::sync::Mutex;
use std::time::Duration;

use pyo3::exceptions::{PyConnectionError, PyIOError, PyRuntimeError, PyTimeoutError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde::de::DeserializeOwned;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::bluetooth::CubeConnector;
use crate::errors::CubeError;
use crate::events::CubeEvent;
use crate::lock;
use crate::logging;
use crate::protocol::{
    AttitudeFormat, LightOperation, MoveToOptions, MoveToTarget, Note, RotateType, SoundOperation,
};
use crate::{Cube, CubeConfig};

fn to_py_err(e: CubeError) -> PyErr {
    match e {
        CubeError::Bluetooth(_) | CubeError::Disconnected => PyConnectionError::new_err(e.to_string()),
        CubeError::Timeout(_) => PyTimeoutError::new_err(e.to_string()),
        CubeError::InvalidArgument(_) => PyValueError::new_err(e.to_string()),
        CubeError::Write(_) | CubeError::Read(_) | CubeError::Subscribe(_) => {
            PyIOError::new_err(e.to_string())
        }
        _ => PyRuntimeError::new_err(e.to_string()),
    }
}

/// Parse a kebab-case enum name such as `"rotate-then-move"`.
fn parse_name<T: DeserializeOwned>(what: &str, name: &str) -> PyResult<T> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .map_err(|_| PyValueError::new_err(format!("unknown {what} {name:?}")))
}

fn json_to_py<'py, T: serde::Serialize>(py: Python<'py>, value: &T) -> PyResult<Bound<'py, PyAny>> {
    let text = serde_json::to_string(value).map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
    py.import("json")?.call_method1("loads", (text,))
}

/// A connected toio Core Cube.
#[pyclass(name = "Cube")]
struct PyCube {
    rt: Runtime,
    cube: Cube,
    events: Mutex<mpsc::UnboundedReceiver<CubeEvent>>,
}

impl PyCube {
    fn block_on<F, T>(&self, py: Python<'_>, fut: F) -> PyResult<T>
    where
        F: std::future::Future<Output = crate::Result<T>> + Send,
        T: Send,
    {
        py.detach(|| self.rt.block_on(fut)).map_err(to_py_err)
    }
}

#[pymethods]
impl PyCube {
    /// Scan for the cube with the given Bluetooth address and connect.
    ///
    /// Args:
    ///     mac: Bluetooth address, e.g. "E0:12:34:56:78:9A".
    ///     scan_timeout: Seconds to wait for the cube to show up.
    ///
    /// Raises:
    ///     ConnectionError: If the cube cannot be found or connected.
    #[staticmethod]
    #[pyo3(signature = (mac, scan_timeout=30.0))]
    fn connect(py: Python<'_>, mac: &str, scan_timeout: f64) -> PyResult<Self> {
        let rt = Runtime::new().map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        let connector = CubeConnector {
            scan_timeout: Duration::from_secs_f64(scan_timeout.max(0.0)),
            ..CubeConnector::default()
        };
        let cube = py
            .detach(|| {
                rt.block_on(async {
                    let peripheral = connector.find(mac).await?;
                    Cube::connect(peripheral, CubeConfig::default()).await
                })
            })
            .map_err(to_py_err)?;
        let events = Mutex::new(cube.events());
        Ok(Self { rt, cube, events })
    }

    #[getter]
    fn address(&self) -> String {
        self.cube.address()
    }

    #[getter]
    fn ble_protocol_version(&self) -> Option<String> {
        self.cube.ble_protocol_version().map(str::to_string)
    }

    /// Drive both wheels (-100..100) for `duration_ms` (0 = until the next
    /// motor command). Blocks until the move is over when `wait` is true.
    #[pyo3(signature = (left, right, duration_ms=0, wait=true))]
    fn move_motors(&self, py: Python<'_>, left: i32, right: i32, duration_ms: u32, wait: bool) -> PyResult<()> {
        self.block_on(py, async {
            let completion = self.cube.move_motors(left, right, duration_ms).await?;
            if wait {
                completion.await;
            }
            Ok(())
        })
    }

    /// Drive through a list of `(x, y)` or `(x, y, angle)` targets on a mat.
    /// Any coordinate may be None to keep the current one.
    #[pyo3(signature = (targets, move_type="rotating-move", max_speed=115, speed_type="constant", timeout=0, overwrite=true))]
    #[allow(clippy::too_many_arguments)]
    fn move_to(
        &self,
        py: Python<'_>,
        targets: Vec<Vec<Option<u16>>>,
        move_type: &str,
        max_speed: u8,
        speed_type: &str,
        timeout: u8,
        overwrite: bool,
    ) -> PyResult<()> {
        let options = MoveToOptions {
            move_type: parse_name("move type", move_type)?,
            max_speed,
            speed_type: parse_name("speed type", speed_type)?,
            timeout,
            overwrite,
        };
        let targets = targets
            .iter()
            .map(|row| match row.as_slice() {
                [x, y] => Ok(MoveToTarget {
                    x: *x,
                    y: *y,
                    ..MoveToTarget::default()
                }),
                [x, y, angle] => Ok(MoveToTarget {
                    x: *x,
                    y: *y,
                    angle: *angle,
                    rotate_type: angle.map(|_| RotateType::AbsoluteOptimal),
                }),
                _ => Err(PyValueError::new_err(format!(
                    "target {row:?} must be (x, y) or (x, y, angle)"
                ))),
            })
            .collect::<PyResult<Vec<_>>>()?;
        self.block_on(py, self.cube.move_to(&targets, &options))
    }

    fn stop(&self, py: Python<'_>) -> PyResult<()> {
        self.block_on(py, self.cube.stop())
    }

    #[pyo3(signature = (red, green, blue, duration_ms=0, wait=false))]
    fn turn_on_light(
        &self,
        py: Python<'_>,
        red: u8,
        green: u8,
        blue: u8,
        duration_ms: u32,
        wait: bool,
    ) -> PyResult<()> {
        let operation = LightOperation::new(duration_ms, red, green, blue);
        self.block_on(py, async {
            let completion = self.cube.turn_on_light(&operation).await?;
            if wait {
                completion.await;
            }
            Ok(())
        })
    }

    /// Play a list of `(duration_ms, red, green, blue)` rows.
    /// `repeat_count` 0 repeats forever.
    #[pyo3(signature = (operations, repeat_count=0, wait=false))]
    fn turn_on_light_with_scenario(
        &self,
        py: Python<'_>,
        operations: Vec<(u32, u8, u8, u8)>,
        repeat_count: u8,
        wait: bool,
    ) -> PyResult<()> {
        let operations: Vec<LightOperation> = operations
            .into_iter()
            .map(|(ms, r, g, b)| LightOperation::new(ms, r, g, b))
            .collect();
        self.block_on(py, async {
            let completion = self
                .cube
                .turn_on_light_with_scenario(&operations, repeat_count)
                .await?;
            if wait {
                completion.await;
            }
            Ok(())
        })
    }

    fn turn_off_light(&self, py: Python<'_>) -> PyResult<()> {
        self.block_on(py, self.cube.turn_off_light())
    }

    fn play_preset_sound(&self, py: Python<'_>, sound_id: u8) -> PyResult<()> {
        self.block_on(py, self.cube.play_preset_sound(sound_id))
    }

    /// Play a list of `(duration_ms, note)` pairs, notes 0-127 or 128 for a rest.
    #[pyo3(signature = (operations, repeat_count=0, wait=false))]
    fn play_sound(
        &self,
        py: Python<'_>,
        operations: Vec<(u32, u8)>,
        repeat_count: u8,
        wait: bool,
    ) -> PyResult<()> {
        let operations = operations
            .into_iter()
            .map(|(ms, note)| {
                Note::new(note)
                    .map(|note| SoundOperation::new(ms, note))
                    .ok_or_else(|| PyValueError::new_err(format!("note {note} out of range")))
            })
            .collect::<PyResult<Vec<_>>>()?;
        self.block_on(py, async {
            let completion = self.cube.play_sound(&operations, repeat_count).await?;
            if wait {
                completion.await;
            }
            Ok(())
        })
    }

    fn stop_sound(&self, py: Python<'_>) -> PyResult<()> {
        self.block_on(py, self.cube.stop_sound())
    }

    /// Last reported motion state as a dict.
    fn motion_status<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        dict.set_item("is_sloped", self.cube.slope_status().map_err(to_py_err)?)?;
        dict.set_item("is_collision_detected", self.cube.collision_status().map_err(to_py_err)?)?;
        dict.set_item("is_double_tapped", self.cube.double_tap_status().map_err(to_py_err)?)?;
        dict.set_item("orientation", self.cube.orientation().map_err(to_py_err)?.code())?;
        dict.set_item("shake_level", self.cube.shake_status().map_err(to_py_err)?)?;
        Ok(dict)
    }

    fn magnet_status<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        let status = self.cube.magnet_status().map_err(to_py_err)?;
        json_to_py(py, &status)
    }

    /// Last attitude in the requested format ("euler", "quaternion" or
    /// "high-precision-euler").
    #[pyo3(signature = (format="euler"))]
    fn attitude<'py>(&self, py: Python<'py>, format: &str) -> PyResult<Bound<'py, PyAny>> {
        match parse_name::<AttitudeFormat>("attitude format", format)? {
            AttitudeFormat::Euler => json_to_py(py, &self.cube.attitude_euler().map_err(to_py_err)?),
            AttitudeFormat::Quaternion => {
                json_to_py(py, &self.cube.attitude_quaternion().map_err(to_py_err)?)
            }
            AttitudeFormat::HighPrecisionEuler => json_to_py(
                py,
                &self.cube.attitude_high_precision_euler().map_err(to_py_err)?,
            ),
        }
    }

    fn button_status(&self, py: Python<'_>) -> PyResult<bool> {
        self.block_on(py, async { Ok(self.cube.button_status().await?.pressed) })
    }

    fn battery_status(&self, py: Python<'_>) -> PyResult<u8> {
        self.block_on(py, async { Ok(self.cube.battery_status().await?.level) })
    }

    #[pyo3(signature = (threshold=7))]
    fn set_collision_threshold(&self, py: Python<'_>, threshold: u8) -> PyResult<()> {
        self.block_on(py, self.cube.set_collision_threshold(threshold))
    }

    #[pyo3(signature = (degrees=45))]
    fn set_flat_threshold(&self, py: Python<'_>, degrees: u8) -> PyResult<()> {
        self.block_on(py, self.cube.set_flat_threshold(degrees))
    }

    /// Next event as `{"event": name, "data": {...}}`, or None when nothing
    /// arrives within `timeout_ms`.
    #[pyo3(signature = (timeout_ms=1000))]
    fn next_event<'py>(&self, py: Python<'py>, timeout_ms: u64) -> PyResult<Option<Bound<'py, PyAny>>> {
        let event = py.detach(|| {
            let mut events = lock(&self.events);
            self.rt.block_on(async {
                tokio::time::timeout(Duration::from_millis(timeout_ms), events.recv())
                    .await
                    .ok()
                    .flatten()
            })
        });
        event.map(|event| json_to_py(py, &event)).transpose()
    }

    fn disconnect(&self, py: Python<'_>) -> PyResult<()> {
        self.block_on(py, self.cube.disconnect())
    }

    fn __repr__(&self) -> String {
        format!(
            "Cube(address={}, protocol={})",
            self.cube.address(),
            self.cube.ble_protocol_version().unwrap_or("unknown")
        )
    }
}

/// Route Rust logs into Python's `logging`, optionally at a fixed level.
#[pyfunction]
#[pyo3(signature = (level=None))]
fn set_log_level(py: Python<'_>, level: Option<&str>) -> PyResult<()> {
    logging::set_python_log_level(py, level)
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    logging::init_python_logging(m.py())?;
    m.add_class::<PyCube>()?;
    m.add_function(wrap_pyfunction!(set_log_level, m)?)?;

    m.add("SERVICE_UUID", crate::protocol::CUBE_SERVICE_UUID.to_string())?;
    m.add("MAX_SPEED", crate::protocol::motor::MAX_SPEED)?;
    m.add("NO_SOUND", Note::NO_SOUND.value())?;

    Ok(())
}
