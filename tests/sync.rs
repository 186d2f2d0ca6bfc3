use std::sync::Arc;

use ha_bridge::*;

fn engine(device: &BulkDevice) -> Engine {
    let _ = env_logger::builder().is_test(true).try_init();
    Engine::with_registry(&Config::default(), Arc::new(Registry::standard()), device.clone())
}

#[test]
fn test_result_is_dirty_until_read() -> Result<(), Error> {
    let device = BulkDevice::new();
    let engine = engine(&device);

    let a = engine.array(vec![1f32, 2., 3., 4.], shape![2, 2])?;
    let b = engine.constant(10f32, shape![2, 2])?;
    assert!(!a.is_dirty());

    let c = engine.add(&a, &b)?;
    assert_eq!(c.representation(), Representation::Bulk);
    assert!(c.is_dirty());

    assert_eq!(c.read()?, vec![11., 12., 13., 14.]);
    assert!(!c.is_dirty());

    Ok(())
}

#[test]
fn test_chained_operations_stay_on_device() -> Result<(), Error> {
    let device = BulkDevice::new();
    let engine = engine(&device);

    let a = engine.array(vec![1f64, 2., 3.], shape![3])?;
    let b = engine.array(vec![4f64, 5., 6.], shape![3])?;

    let c = engine.add(&a, &b)?;
    let d = engine.mul(&c, &a)?;

    let stats = device.stats();
    assert_eq!(stats.downloads, 0);
    assert_eq!(stats.uploads, 2);
    assert_eq!(stats.launches, 2);

    assert_eq!(d.read()?, vec![5., 14., 27.]);
    assert_eq!(device.stats().downloads, 1);

    // reading again uses the synchronized host copy
    assert_eq!(d.read_value(&[2])?, 27.);
    assert_eq!(device.stats().downloads, 1);
    assert_eq!(device.stats().open_views, 0);

    Ok(())
}

#[test]
fn test_write_to_resident_output() -> Result<(), Error> {
    let device = BulkDevice::new();
    let engine = engine(&device);

    let a = engine.array(vec![1f32, -2.], shape![2])?;
    let output = engine.unary(Abs, &a)?;
    assert!(output.is_dirty());

    // the next result is written into the existing device copy of the output
    assert_eq!(engine.unary_into(Neg, &a, &output)?, BackendId::Bulk);
    assert!(output.is_dirty());
    assert_eq!(output.read()?, vec![-1., 2.]);

    // a host write discards the device copy
    output.write_value_at(&[0], 7.)?;
    assert!(!output.is_dirty());
    assert!(!output.accessor().is_dirty());
    assert_eq!(output.read()?, vec![7., 2.]);

    Ok(())
}

#[test]
fn test_host_reads_dirty_inputs() -> Result<(), Error> {
    let device = BulkDevice::new();
    let engine = engine(&device);

    let a = engine.array(vec![1f32, 2.], shape![2])?;
    let b = engine.array(vec![3f32, 2.], shape![2])?;
    let c = engine.add(&a, &b)?;
    assert!(c.is_dirty());

    // the bulk backend has no comparison kernel, so the host reads the device result
    let lt = engine.lt(&c, &b)?;
    assert_eq!(lt.read()?, vec![0, 0]);

    let gt = engine.gt(&c, &b)?;
    assert_eq!(gt.read()?, vec![1, 1]);
    assert!(!c.is_dirty());

    Ok(())
}

#[test]
fn test_copy() -> Result<(), Error> {
    let device = BulkDevice::new();
    let engine = engine(&device);

    let a = engine.array(vec![1f32, 2., 3.], shape![3])?;
    let b = engine.add(&a, &a)?;
    let lookups = engine.registry().lookups();

    let copy = engine.copy(&b)?;
    assert_eq!(engine.registry().lookups(), lookups);
    assert!(copy.is_dirty());
    assert!(!copy.accessor().shares_buffer(b.accessor()));

    let shared = b.share();
    assert_eq!(engine.copy_into(&b, &shared)?, BackendId::Bulk);

    assert_eq!(copy.read()?, vec![2., 4., 6.]);
    assert_eq!(b.read()?, vec![2., 4., 6.]);
    assert_eq!(device.stats().open_views, 0);

    Ok(())
}
