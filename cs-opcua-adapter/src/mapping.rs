//! One-shot mapping of every source variable into the address space.

use crate::address_space::{AddressSpace, NodeId};
use crate::errors::{AdapterError, AdapterResult};
use crate::process::{ProcessVariable, ProcessVariableSource};
use crate::type_tag::{self, TagLayout};
use crate::variable::{MappedVariable, VariableSpec, map_variable};
use std::sync::Arc;

/// A variable the mapping pass left out, and why.
#[derive(Debug)]
pub struct SkippedVariable {
    pub name: String,
    pub error: AdapterError,
}

/// Outcome of [`map_all`].
#[derive(Debug, Default)]
pub struct MappingReport {
    /// Successfully mapped variables, in source order.
    pub mapped: Vec<MappedVariable>,
    pub skipped: Vec<SkippedVariable>,
}

impl MappingReport {
    pub fn find(&self, name: &str) -> Option<&MappedVariable> {
        self.mapped.iter().find(|v| v.key() == name)
    }
}

/// Render an array snapshot as `[e0, e1, ...]`.
pub fn format_array(values: &[i32]) -> String {
    let items: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("[{}]", items.join(", "))
}

/// Map every variable of `source` under `base`.
///
/// Failures are per variable: the error is logged, recorded in
/// [`MappingReport::skipped`] and the pass moves on.
pub fn map_all(
    source: &dyn ProcessVariableSource,
    space: &Arc<dyn AddressSpace>,
    base: NodeId,
    layout: TagLayout,
) -> MappingReport {
    let variables = source.all_process_variables();
    let span = tracing::info_span!("adapter.map_all", base = %base, count = variables.len());
    let _enter = span.enter();
    tracing::info!("Start mapping...");

    let mut report = MappingReport::default();
    for variable in variables {
        match map_one(source, space, base, layout, &variable) {
            Ok(mapped) => {
                let kind = if variable.is_array { "array" } else { "scalar" };
                tracing::info!(
                    variable = %variable.name,
                    kind,
                    node = %mapped.node_id(),
                    "mapped"
                );
                report.mapped.push(mapped);
            }
            Err(error) => {
                let scope = if error.is_variable_scoped() {
                    "variable"
                } else {
                    "address_space"
                };
                tracing::warn!(
                    variable = %variable.name,
                    value_type = %variable.value_type,
                    scope,
                    error = %error,
                    "skipping process variable"
                );
                report.skipped.push(SkippedVariable {
                    name: variable.name,
                    error,
                });
            }
        }
    }

    tracing::info!(
        mapped = report.mapped.len(),
        skipped = report.skipped.len(),
        "mapping completed"
    );
    report
}

fn map_one(
    source: &dyn ProcessVariableSource,
    space: &Arc<dyn AddressSpace>,
    base: NodeId,
    layout: TagLayout,
    variable: &ProcessVariable,
) -> AdapterResult<MappedVariable> {
    let type_tag = type_tag::resolve(variable.value_type)?;

    let value = if variable.is_array {
        format_array(&source.process_array_i32(&variable.name)?)
    } else {
        source.process_scalar_i32(&variable.name)?.to_string()
    };

    map_variable(
        space,
        base,
        VariableSpec {
            name: variable.name.clone(),
            value,
            type_tag,
            is_array: variable.is_array,
            timestamp: variable.timestamp,
        },
        layout,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::{FieldId, MemoryAddressSpace, ids};
    use crate::process::{MockProcessVariableSource, PvStore};
    use crate::timestamp::TimeStamp;
    use crate::type_tag::ValueType;
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn ts(seconds: u32) -> TimeStamp {
        TimeStamp::new(seconds, 0, 0, 0)
    }

    fn memory_space() -> (Arc<MemoryAddressSpace>, Arc<dyn AddressSpace>) {
        let memory = Arc::new(MemoryAddressSpace::new());
        let space: Arc<dyn AddressSpace> = memory.clone();
        (memory, space)
    }

    fn mapped_names(space: &Arc<dyn AddressSpace>) -> Vec<String> {
        space
            .browse(&ids::PROCESS_VARIABLES)
            .unwrap()
            .into_iter()
            .map(|n| n.display_name.text)
            .collect()
    }

    #[test]
    fn test_format_array() {
        assert_eq!(format_array(&[]), "[]");
        assert_eq!(format_array(&[7]), "[7]");
        assert_eq!(format_array(&[1, -2, 3]), "[1, -2, 3]");
    }

    #[test]
    fn test_scalar_scenario() {
        let store = PvStore::new();
        store.add_scalar("Temp1", 42i32, ts(100)).unwrap();
        let (_, space) = memory_space();

        let report = map_all(&store, &space, ids::PROCESS_VARIABLES, TagLayout::Standard);
        assert!(report.skipped.is_empty());
        let temp1 = report.find("Temp1").unwrap();
        let node = temp1.node_id();

        assert_eq!(mapped_names(&space), ["Temp1"]);
        assert_eq!(space.read_field(&node, FieldId::Type).unwrap(), "int32_t");
        assert_eq!(space.read_field(&node, FieldId::Value).unwrap(), "42");
        let stamp = space.describe(&temp1.timestamp_node_id()).unwrap();
        assert_eq!(stamp.timestamp().unwrap().seconds, 100);
    }

    #[test]
    fn test_array_scenario_preserves_order() {
        let store = PvStore::new();
        store.add_array("Vec1", vec![1i32, 2, 3], ts(1)).unwrap();
        let (_, space) = memory_space();

        let report = map_all(&store, &space, ids::PROCESS_VARIABLES, TagLayout::Standard);
        let vec1 = report.find("Vec1").unwrap();
        assert!(vec1.is_array());
        assert_eq!(
            space.read_field(&vec1.node_id(), FieldId::Value).unwrap(),
            "[1, 2, 3]"
        );
    }

    #[test]
    fn test_unsupported_type_is_skipped_and_mapping_continues() {
        let store = PvStore::new();
        store.add_scalar("Before", 1i32, ts(1)).unwrap();
        store.add_scalar("Bad1", true, ts(1)).unwrap();
        store.add_scalar("After", 2i32, ts(1)).unwrap();
        let (_, space) = memory_space();

        let report = map_all(&store, &space, ids::PROCESS_VARIABLES, TagLayout::Standard);
        assert_eq!(mapped_names(&space), ["Before", "After"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "Bad1");
        assert!(matches!(
            report.skipped[0].error,
            AdapterError::UnsupportedType(ValueType::Bool)
        ));
    }

    #[test]
    fn test_bad_cast_is_skipped() {
        let store = PvStore::new();
        store.add_scalar("Pressure", 1.5f64, ts(1)).unwrap();
        store.add_array("Spectrum", vec![0.5f32, 0.25], ts(1)).unwrap();
        store.add_scalar("Count", 9i32, ts(1)).unwrap();
        let (_, space) = memory_space();

        let report = map_all(&store, &space, ids::PROCESS_VARIABLES, TagLayout::Standard);
        assert_eq!(mapped_names(&space), ["Count"]);
        assert_eq!(report.skipped.len(), 2);
        assert!(
            report
                .skipped
                .iter()
                .all(|s| matches!(s.error, AdapterError::BadCast { .. }))
        );
    }

    #[test]
    fn test_n_minus_k_nodes_and_k_warnings() {
        let store = PvStore::new();
        store.add_scalar("A", 1i32, ts(1)).unwrap();
        store.add_scalar("B", 2u64, ts(1)).unwrap();
        store.add_array("C", vec![1i32, 2], ts(1)).unwrap();
        store.add_scalar("D", "text".to_string(), ts(1)).unwrap();
        store.add_scalar("E", -5i64, ts(1)).unwrap();
        let (memory, space) = memory_space();

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let report = tracing::subscriber::with_default(subscriber, || {
            map_all(&store, &space, ids::PROCESS_VARIABLES, TagLayout::Standard)
        });

        let (n, k) = (5, 3);
        assert_eq!(report.mapped.len(), n - k);
        assert_eq!(mapped_names(&space).len(), n - k);
        // two seeded folders plus object and timestamp node per variable
        assert_eq!(memory.node_count(), 2 + 2 * (n - k));

        let text = logs.text();
        assert_eq!(text.matches("skipping process variable").count(), k);
        assert_eq!(text.matches("scope=\"variable\"").count(), k);
        for name in ["B", "D", "E"] {
            assert!(text.contains(&format!("variable={name}")), "{text}");
        }
    }

    #[test]
    fn test_unmapped_base_skips_every_variable() {
        let store = PvStore::new();
        store.add_scalar("A", 1i32, ts(1)).unwrap();
        store.add_scalar("B", 2i32, ts(1)).unwrap();
        let (memory, space) = memory_space();

        let report = map_all(&store, &space, NodeId::NULL, TagLayout::Standard);
        assert!(report.mapped.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(memory.node_count(), 2);
    }

    #[test]
    fn test_array_value_is_fetched_from_source() {
        let mut source = MockProcessVariableSource::new();
        source.expect_all_process_variables().returning(|| {
            vec![ProcessVariable {
                name: "Vec1".into(),
                value_type: ValueType::Int16,
                is_array: true,
                timestamp: TimeStamp::new(5, 6, 7, 8),
            }]
        });
        source
            .expect_process_array_i32()
            .withf(|name| name == "Vec1")
            .times(1)
            .returning(|_| Ok(vec![3, 2, 1]));
        source.expect_process_scalar_i32().never();
        let (_, space) = memory_space();

        let report = map_all(&source, &space, ids::PROCESS_VARIABLES, TagLayout::Standard);
        let vec1 = report.find("Vec1").unwrap();
        assert_eq!(vec1.value(), "[3, 2, 1]");
        assert_eq!(vec1.value_type(), "int16_t");
        assert_eq!(vec1.timestamp(), TimeStamp::new(5, 6, 7, 8));
    }

    #[test]
    fn test_address_space_failure_is_logged_with_its_scope() {
        let mut source = MockProcessVariableSource::new();
        source.expect_all_process_variables().returning(|| {
            ["Dup", "Dup"]
                .into_iter()
                .map(|name| ProcessVariable {
                    name: name.into(),
                    value_type: ValueType::Int32,
                    is_array: false,
                    timestamp: TimeStamp::default(),
                })
                .collect()
        });
        source.expect_process_scalar_i32().returning(|_| Ok(1));
        let (_, space) = memory_space();

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let report = tracing::subscriber::with_default(subscriber, || {
            map_all(&source, &space, ids::PROCESS_VARIABLES, TagLayout::Standard)
        });

        assert_eq!(report.mapped.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(!report.skipped[0].error.is_variable_scoped());
        assert!(logs.text().contains("scope=\"address_space\""), "{}", logs.text());
    }

    #[test]
    fn test_dropping_report_clears_address_space() {
        let store = PvStore::new();
        store.add_scalar("A", 1i32, ts(1)).unwrap();
        store.add_array("B", vec![1i32], ts(1)).unwrap();
        let (memory, space) = memory_space();

        let report = map_all(&store, &space, ids::PROCESS_VARIABLES, TagLayout::Standard);
        assert_eq!(memory.node_count(), 6);
        drop(report);
        assert_eq!(memory.node_count(), 2);
    }
}
