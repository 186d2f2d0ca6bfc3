use std::sync::Arc;

use ha_bridge::*;

type Kernel = fn(f32, f32) -> f32;

fn kernel_add(left: f32, right: f32) -> f32 {
    left + right
}

fn kernel_generic(_left: f32, _right: f32) -> f32 {
    f32::NAN
}

/// An arithmetic operator which also declares that it adds
#[derive(Copy, Clone, Debug, Default)]
struct Plus;

impl Operator for Plus {
    const NAME: &'static str = "plus";
    const CAPABILITIES: Capabilities = Capabilities::of(&[Capability::Math, Capability::Add]);
}

impl BinaryOp<f32> for Plus {
    fn call(&self, left: f32, right: f32) -> f32 {
        left + right
    }
}

/// An arithmetic operator with no more specific capability
#[derive(Copy, Clone, Debug, Default)]
struct Hypot;

impl Operator for Hypot {
    const NAME: &'static str = "hypot";
    const CAPABILITIES: Capabilities = Capabilities::of(&[Capability::Scalar, Capability::Math]);
}

impl BinaryOp<f32> for Hypot {
    fn call(&self, left: f32, right: f32) -> f32 {
        left.hypot(right)
    }
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_registration_order_decides() {
    init_logger();

    let table = KernelTable::<Kernel>::new()
        .register(Capability::Add, "add", kernel_add)
        .register(Capability::Math, "generic", kernel_generic);

    let binding = table.resolve::<Plus>().expect("binding");
    assert_eq!(binding.name(), "add");
    assert_eq!(binding.index(), 0);
    assert_eq!((binding.kernel())(1., 2.), 3.);

    let binding = table.resolve::<Hypot>().expect("binding");
    assert_eq!(binding.name(), "generic");
    assert_eq!(binding.tag(), Capability::Math);

    let reversed = KernelTable::<Kernel>::new()
        .register(Capability::Math, "generic", kernel_generic)
        .register(Capability::Add, "add", kernel_add);

    assert_eq!(reversed.resolve::<Plus>().expect("binding").name(), "generic");
}

#[test]
fn test_resolve_is_idempotent() {
    init_logger();

    let table = KernelTable::<Kernel>::new()
        .register(Capability::Add, "add", kernel_add)
        .register(Capability::Math, "generic", kernel_generic);

    let first = table.resolve::<Plus>();
    let second = table.resolve::<Plus>();
    assert_eq!(first, second);
    assert_eq!(table.cached(), 1);

    assert!(table.resolve::<Assign>().is_none());
    assert!(table.resolve::<Assign>().is_none());
    assert_eq!(table.cached(), 2);
}

#[test]
fn test_user_operator_uses_builtin_kernel() -> Result<(), Error> {
    init_logger();

    let registry = Registry::standard();

    let binding = registry
        .resolve::<Plus, bulk::BinaryKernel<f32>>(BackendId::Bulk, DType::F32, CallShape::Binary)
        .expect("binding");

    assert_eq!(binding.name(), "add");

    assert!(registry
        .resolve::<Hypot, bulk::BinaryKernel<f32>>(BackendId::Bulk, DType::F32, CallShape::Binary)
        .is_none());

    let engine = Engine::with_registry(&Config::default(), Arc::new(registry), BulkDevice::new());
    let left = engine.array(vec![3f32, 5.], shape![2])?;
    let right = engine.array(vec![4f32, 12.], shape![2])?;
    let output = engine.zeros::<f32>(shape![2])?;

    assert_eq!(engine.binary_into(Plus, &left, &right, &output)?, BackendId::Bulk);
    assert_eq!(output.read()?, vec![7., 17.]);

    // no bulk kernel matches, so the generic loop of the raw backend can't run either
    // on a bulk output, and the host performs the operation
    assert_eq!(engine.binary_into(Hypot, &left, &right, &output)?, BackendId::Host);
    assert_eq!(output.read()?, vec![5., 13.]);

    Ok(())
}
