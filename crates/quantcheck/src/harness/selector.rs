use quantcheck_core::{bail, Program, ProgramVariant, Result, TensorDescriptor};

// Shape-specialization selector
//
// One logical computation is compiled under three variants that differ only
// in how much shape information the backend sees at compile time. The
// selector derives the partially- and fully-dynamic signatures from a static
// base, so the three programs in a family can never drift apart by hand.

/// Which dimension indices the partially-dynamic variant erases.
///
/// This is a configured policy, not an inference: by default the leading
/// dimension of every non-scalar input is erased, which exercises the common
/// batch-size-unknown compilation path. Indices past a descriptor's rank are
/// ignored, so one policy applies uniformly to inputs of different ranks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErasurePolicy {
    dims: Vec<usize>,
}

impl ErasurePolicy {
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }
}

impl Default for ErasurePolicy {
    fn default() -> Self {
        Self { dims: vec![0] }
    }
}

/// Apply a variant's erasure to one descriptor.
pub fn specialize_descriptor(
    desc: &TensorDescriptor,
    variant: ProgramVariant,
    policy: &ErasurePolicy,
) -> TensorDescriptor {
    match variant {
        ProgramVariant::Static => desc.clone(),
        ProgramVariant::PartiallyDynamic => desc.with_dynamic_dims(policy.dims()),
        ProgramVariant::FullyDynamic => desc.fully_dynamic(),
    }
}

/// Apply a variant's erasure to a descriptor list, in order.
pub fn specialize_descriptors(
    descs: &[TensorDescriptor],
    variant: ProgramVariant,
    policy: &ErasurePolicy,
) -> Vec<TensorDescriptor> {
    descs
        .iter()
        .map(|d| specialize_descriptor(d, variant, policy))
        .collect()
}

/// Rewrite a program for a variant: rename the marker segment and erase the
/// signature descriptors. The body is untouched.
pub fn specialize_program(
    program: &Program,
    variant: ProgramVariant,
    policy: &ErasurePolicy,
) -> Program {
    let mut out = program.clone();
    out.name = variant.rename(&program.name);
    for (_, desc) in &mut out.inputs {
        *desc = specialize_descriptor(desc, variant, policy);
    }
    for (_, desc) in &mut out.outputs {
        *desc = specialize_descriptor(desc, variant, policy);
    }
    out
}

/// Derive the full variant family from a static base program.
///
/// The base must be static-marked (or carry no marker) and declare fully
/// concrete input shapes; the returned programs are ordered as
/// [`ProgramVariant::ALL`].
pub fn emit_variants(base: &Program, policy: &ErasurePolicy) -> Result<[Program; 3]> {
    match base.variant() {
        Some(ProgramVariant::Static) | None => {}
        Some(other) => bail!(
            "variant family must be derived from a static base, `{}` is {}",
            base.name,
            other
        ),
    }
    for (name, desc) in &base.inputs {
        if !desc.is_static() {
            bail!(
                "base program `{}` input `{}` has dynamic dims ({})",
                base.name,
                name,
                desc
            );
        }
    }
    Ok(ProgramVariant::ALL.map(|v| specialize_program(base, v, policy)))
}
