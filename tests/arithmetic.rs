use ha_bridge::*;

fn engines() -> Vec<Engine> {
    let _ = env_logger::builder().is_test(true).try_init();

    [Config::default(), Config::new(vec![BackendId::Raw]).expect("config"), Config::host_only()]
        .iter()
        .map(Engine::new)
        .collect()
}

#[test]
fn test_add() -> Result<(), Error> {
    for engine in engines() {
        let left = engine.array((0..10).map(|n| n as f32).collect(), shape![5, 2])?;
        let right = engine.array((0..10).rev().map(|n| n as f32).collect(), shape![5, 2])?;

        let actual = engine.add(&left, &right)?;
        let expected = engine.constant(9f32, shape![5, 2])?;
        assert_eq!(actual.read()?, expected.read()?);
        assert!(engine.eq(&actual, &expected)?.read()?.into_iter().all(|eq| eq == 1));
    }

    Ok(())
}

#[test]
fn test_mismatched_shapes() -> Result<(), Error> {
    for engine in engines() {
        let left = engine.zeros::<f64>(shape![2, 3])?;
        let right = engine.zeros::<f64>(shape![3, 2])?;
        assert!(engine.add(&left, &right).is_err());
        assert!(engine.matmul(&left, &left).is_err());
    }

    Ok(())
}

#[test]
fn test_div_and_mod() -> Result<(), Error> {
    for engine in engines() {
        let left = engine.array(vec![7i16, -7, 7, 0], shape![4])?;
        let right = engine.array(vec![2i16, 2, 0, 3], shape![4])?;

        assert_eq!(engine.binary(Div, &left, &right)?.read()?, vec![3, -3, 0, 0]);
        assert_eq!(engine.binary(Mod, &left, &right)?.read()?, vec![1, -1, 0, 0]);

        let left = engine.array(vec![7f64, -7.5], shape![2])?;
        let right = engine.array(vec![2f64, 2.], shape![2])?;
        assert_eq!(engine.binary(Div, &left, &right)?.read()?, vec![3.5, -3.75]);
        assert_eq!(engine.binary(Mod, &left, &right)?.read()?, vec![1., -1.5]);
    }

    Ok(())
}

#[test]
fn test_unary() -> Result<(), Error> {
    for engine in engines() {
        let input = engine.array(vec![-1.5f32, 0.5, 2.5, 4.], shape![2, 2])?;

        assert_eq!(engine.unary(Abs, &input)?.read()?, vec![1.5, 0.5, 2.5, 4.]);
        assert_eq!(engine.unary(Floor, &input)?.read()?, vec![-2., 0., 2., 4.]);
        assert_eq!(engine.unary(Ceil, &input)?.read()?, vec![-1., 1., 3., 4.]);
        assert_eq!(engine.unary(Round, &input)?.read()?, vec![-2., 0., 2., 4.]);
        assert_eq!(engine.unary(Neg, &input)?.read()?, vec![1.5, -0.5, -2.5, -4.]);

        let squares = engine.array(vec![4f64, 9., 16.], shape![3])?;
        assert_eq!(engine.unary(Sqrt, &squares)?.read()?, vec![2., 3., 4.]);
    }

    Ok(())
}

#[test]
fn test_reduce() -> Result<(), Error> {
    for engine in engines() {
        let input = engine.array((1..=24).map(|n| n as f64).collect(), shape![2, 3, 4])?;

        let sums = engine.reduce(Add, &input, 1)?;
        assert_eq!(sums.shape(), &[2, 4]);
        assert_eq!(sums.read()?, vec![15., 18., 21., 24., 51., 54., 57., 60.]);

        let maxima = engine.reduce(Max, &input, 0)?;
        assert_eq!(maxima.shape(), &[3, 4]);
        assert_eq!(maxima.read()?, (13..=24).map(|n| n as f64).collect::<Vec<_>>());

        let products = engine.reduce(Mul, &input, 2)?;
        assert_eq!(products.read_value(&[0, 0])?, 24.);

        assert_eq!(engine.sum(&input)?, 300.);
        assert_eq!(engine.max(&input)?, 24.);
        assert_eq!(engine.min(&input)?, 1.);

        let empty = engine.zeros::<f64>(shape![2, 0])?;
        assert!(engine.reduce(Add, &empty, 1).is_err());
        assert!(engine.sum(&empty).is_err());
    }

    Ok(())
}

#[test]
fn test_matmul() -> Result<(), Error> {
    for engine in engines() {
        let left = engine.array((1..=6).map(|n| n as f32).collect(), shape![2, 3])?;
        let right = engine.array((7..=12).map(|n| n as f32).collect(), shape![3, 2])?;

        let product = engine.matmul(&left, &right)?;
        assert_eq!(product.shape(), &[2, 2]);
        assert_eq!(product.read()?, vec![58., 64., 139., 154.]);

        let left = engine.array(vec![1u32, 2, 3, 4], shape![2, 2])?;
        let right = engine.array(vec![5u32, 6, 7, 8], shape![2, 2])?;
        assert_eq!(engine.matmul(&left, &right)?.read()?, vec![19, 22, 43, 50]);
    }

    Ok(())
}

#[test]
fn test_large_arrays() -> Result<(), Error> {
    for engine in engines() {
        let size = 1_000;
        let left = engine.array((0..size).map(|n| n as f64).collect(), shape![10, 100])?;
        let right = engine.constant(1f64, shape![10, 100])?;

        let sum = engine.sum(&engine.add(&left, &right)?)?;
        assert_eq!(sum, (1..=size).sum::<usize>() as f64);

        let cast: Array<u32> = engine.cast(&left)?;
        assert_eq!(cast.read_value(&[9, 99])?, 999);
    }

    Ok(())
}

#[test]
fn test_reductions_of_infinite_values() -> Result<(), Error> {
    for engine in engines() {
        let falling = engine.constant(f32::NEG_INFINITY, shape![2])?;
        assert_eq!(engine.max(&falling)?, f32::NEG_INFINITY);
        assert_eq!(engine.reduce(Max, &falling, 0)?.read()?, vec![f32::NEG_INFINITY]);

        let rising = engine.constant(f64::INFINITY, shape![2, 2])?;
        assert_eq!(engine.min(&rising)?, f64::INFINITY);
        assert_eq!(engine.reduce(Min, &rising, 1)?.read()?, vec![f64::INFINITY; 2]);

        let mixed = engine.array(vec![f32::NAN, 1., 2., f32::NAN], shape![2, 2])?;
        assert_eq!(engine.max(&mixed)?, 2.);
        assert_eq!(engine.min(&mixed)?, 1.);
        assert_eq!(engine.reduce(Max, &mixed, 0)?.read()?, vec![2., 1.]);
    }

    let engine = Engine::default();
    let falling = engine.constant(f32::NEG_INFINITY, shape![2])?;
    let (backend, max) = engine.aggregate_with_backend(Max, &falling)?;
    assert_eq!((backend, max), (BackendId::Bulk, f32::NEG_INFINITY));

    Ok(())
}

#[test]
fn test_max_plus_matmul() -> Result<(), Error> {
    for engine in engines() {
        let left = engine.array(vec![-5i32, -6], shape![1, 2])?;
        let right = engine.array(vec![-1i32, -2], shape![2, 1])?;
        assert_eq!(engine.matmul_with(Max, Add, &left, &right)?.read()?, vec![-6]);

        let left = engine.array(vec![-5f32, -6., -1., -3.], shape![2, 2])?;
        let right = engine.array(vec![-1f32, -7., -2., -4.], shape![2, 2])?;
        let output = engine.zeros::<f32>(shape![2, 2])?;

        assert_eq!(
            engine.matmul_with_into(Max, Add, &left, &right, &output)?,
            BackendId::Host
        );

        assert_eq!(output.read()?, vec![-6., -10., -2., -7.]);
    }

    Ok(())
}
