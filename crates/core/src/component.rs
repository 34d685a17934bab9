use crate::{
    error::ComponentError,
    partials::{PartialDeclaration, Partials},
    value::{SlotSpec, Slots},
};

/// An opaque analysis unit that can be placed in a [`Workflow`].
///
/// A component maps named inputs to named outputs. It may also report the
/// partial derivatives of its outputs with respect to its inputs, which the
/// [Jacobian assembler](crate::jacobian) chains together across the workflow.
///
/// Each call is blocking and synchronous. Components are free to keep internal
/// state between calls, such as a warm-started external solver.
///
/// [`Workflow`]: crate::Workflow
pub trait Component {
    /// Declares the input slots, with their shapes and default values.
    fn inputs(&self) -> Vec<SlotSpec>;

    /// Declares the output slots, with their shapes.
    fn outputs(&self) -> Vec<SlotSpec>;

    /// Computes every declared output from the given inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying analysis fails.
    fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError>;

    /// Computes partial derivative blocks at the given inputs.
    ///
    /// Returns `Ok(None)` when the component does not support linearization,
    /// in which case all its partials are treated as exact zeros. Pairs left
    /// out of a returned [`Partials`] are also zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying analysis fails.
    fn linearize(&mut self, inputs: &Slots) -> Result<Option<Partials>, ComponentError> {
        let _ = inputs;
        Ok(None)
    }

    /// Declares how each `(output, input)` partial is obtained.
    ///
    /// Pairs left undeclared are not computed and are treated as zero.
    fn partial_declarations(&self) -> Vec<PartialDeclaration> {
        Vec::new()
    }
}

impl<C: Component + ?Sized> Component for Box<C> {
    fn inputs(&self) -> Vec<SlotSpec> {
        (**self).inputs()
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        (**self).outputs()
    }

    fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
        (**self).evaluate(inputs)
    }

    fn linearize(&mut self, inputs: &Slots) -> Result<Option<Partials>, ComponentError> {
        (**self).linearize(inputs)
    }

    fn partial_declarations(&self) -> Vec<PartialDeclaration> {
        (**self).partial_declarations()
    }
}
