use ha_bridge::*;

#[test]
fn test_size_one_is_plain() -> Result<(), Error> {
    let engine = Engine::new(&Config::default());
    assert!(engine.backends().contains(&BackendId::Bulk));

    let scalar = engine.array(vec![1f32], shape![1])?;
    assert_eq!(scalar.representation(), Representation::Plain);

    let scalar = engine.zeros::<f64>(shape![1, 1, 1])?;
    assert_eq!(scalar.representation(), Representation::Plain);

    let vector = engine.array(vec![1f32, 2.], shape![2])?;
    assert_eq!(vector.representation(), Representation::Bulk);

    Ok(())
}

#[test]
fn test_unsupported_types_are_plain() -> Result<(), Error> {
    let engine = Engine::new(&Config::default());

    assert_eq!(engine.zeros::<i32>(shape![4])?.representation(), Representation::Plain);
    assert_eq!(engine.zeros::<u8>(shape![4])?.representation(), Representation::Plain);
    assert_eq!(engine.zeros::<f32>(shape![4])?.representation(), Representation::Bulk);

    Ok(())
}

#[test]
fn test_plain_without_bulk_backend() -> Result<(), Error> {
    for config in [Config::host_only(), "raw".parse()?] {
        let engine = Engine::new(&config);
        assert!(!engine.backends().contains(&BackendId::Bulk));
        assert_eq!(engine.zeros::<f32>(shape![4])?.representation(), Representation::Plain);
    }

    Ok(())
}

#[test]
fn test_new_accessors_are_lazy() -> Result<(), Error> {
    let engine = Engine::default();

    let array = engine.zeros::<f32>(shape![2, 3])?;
    assert!(!array.accessor().is_allocated());
    assert_eq!(array.read()?, vec![0.; 6]);

    let array = engine.zeros::<i64>(shape![2, 3])?;
    assert!(!array.accessor().is_allocated());
    assert_eq!(array.read_value(&[1, 2])?, 0);
    assert!(array.accessor().is_allocated());

    Ok(())
}
