use cs_opcua_adapter::{AdapterResult, PvStore, TimeStamp};

/// Variable set served when no control system is attached.
///
/// `Pressure` and `Enabled` are expected to be skipped by the mapping pass:
/// the first cannot be read as `int32`, the second has no type tag.
pub fn demo_store() -> AdapterResult<PvStore> {
    let now = TimeStamp::now();
    let store = PvStore::new();
    store.add_scalar("Temp1", 42i32, now)?;
    store.add_scalar("Counter", 0i32, now)?;
    store.add_array("Vec1", vec![1i32, 2, 3], now)?;
    store.add_array("Waveform", (0..16).map(|i| i * i).collect::<Vec<i32>>(), now)?;
    store.add_scalar("Pressure", 1.013f64, now)?;
    store.add_scalar("Enabled", true, now)?;
    Ok(store)
}
