use std::sync::Arc;

use ha_bridge::bulk::BinaryKernel;
use ha_bridge::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn lost(_left: &DeviceArray<f32>, _right: &DeviceArray<f32>) -> Result<DeviceArray<f32>, Error> {
    Err(Error::Unsupported("the bulk device was lost".to_string()))
}

#[test]
fn test_decline_has_no_side_effects() -> Result<(), Error> {
    init_logger();

    let device = BulkDevice::new();
    let bulk = Bulk::new(device.clone(), Arc::new(Registry::standard()));

    let left = Accessor::from(HostAccessor::from_vec(vec![1i32, 2]));
    let right = Accessor::from(HostAccessor::from_vec(vec![3i32, 4]));
    let output = Accessor::from(HostAccessor::<i32>::new(2));

    assert!(!bulk.binary(Add, &left, &right, &output)?);
    assert!(!output.is_allocated());
    assert_eq!(left.to_vec()?, vec![1, 2]);
    assert_eq!(device.stats(), DeviceStats::default());

    // a supported element type with no matching kernel
    let input = Accessor::from(DeviceAccessor::from_vec(device.clone(), vec![1f32, 2.]));
    let output = Accessor::from(DeviceAccessor::<f32>::new(device.clone(), 2));

    assert!(!bulk.nullary(One, &output)?);
    assert!(bulk.aggregate(Div, &input)?.is_none());
    assert!(!output.is_allocated());
    assert!(!output.is_dirty());
    assert_eq!(device.stats().uploads, 0);
    assert_eq!(device.stats().launches, 0);

    Ok(())
}

#[test]
fn test_raw_declines_bulk_arrays() -> Result<(), Error> {
    init_logger();

    let device = BulkDevice::new();
    let raw = Raw::new(Arc::new(Registry::standard()));

    let input = Accessor::from(DeviceAccessor::from_vec(device.clone(), vec![1f64, 4.]));
    let output = Accessor::from(HostAccessor::<f64>::new(2));

    assert!(!raw.unary(Sqrt, &input, &output)?);
    assert!(!raw.unary(Assign, &input, &output)?);
    assert!(!output.is_allocated());

    Ok(())
}

#[test]
fn test_copy_skips_registry() -> Result<(), Error> {
    init_logger();

    for config in [Config::default(), "raw".parse()?, Config::host_only()] {
        let engine = Engine::new(&config);

        let floats = engine.array(vec![1f32, 2., 3.], shape![3])?;
        let ints = engine.array(vec![1u64, 2, 3], shape![3])?;

        let lookups = engine.registry().lookups();
        let float_copy = engine.copy(&floats)?;
        let int_copy = engine.copy(&ints)?;
        assert_eq!(engine.registry().lookups(), lookups);

        assert_eq!(float_copy.read()?, floats.read()?);
        assert_eq!(int_copy.read()?, ints.read()?);
    }

    Ok(())
}

#[test]
fn test_kernel_failure_is_fatal() -> Result<(), Error> {
    init_logger();

    let mut registry = Registry::standard();
    let failing = KernelTable::<BinaryKernel<f32>>::new().register(Capability::Add, "add", lost);
    registry.register(BackendId::Bulk, DType::F32, CallShape::Binary, failing);

    let device = BulkDevice::new();
    let engine = Engine::with_registry(&Config::default(), Arc::new(registry), device.clone());

    let left = engine.array(vec![1f32, 2., 3.], shape![3])?;
    let right = engine.array(vec![4f32, 5., 6.], shape![3])?;
    let output = engine.zeros::<f32>(shape![3])?;

    let result = engine.binary_into(Add, &left, &right, &output);

    match result {
        Err(Error::Kernel { backend, op, cause }) => {
            assert_eq!(backend, BackendId::Bulk);
            assert_eq!(op, "add");
            assert!(matches!(*cause, Error::Unsupported(_)));
        }
        other => panic!("expected a kernel error, not {other:?}"),
    }

    assert!(!output.is_dirty());
    assert_eq!(device.stats().open_views, 0);
    assert_eq!(output.read()?, vec![0.; 3]);

    // the failure did not disable the other kernels
    let output = engine.binary(Sub, &left, &right)?;
    assert_eq!(output.read()?, vec![-3.; 3]);

    Ok(())
}
