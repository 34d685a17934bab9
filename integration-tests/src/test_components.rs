//! Small aerodynamic stand-ins with known closed-form behavior.

pub mod paraboloid {
    use braid_core::{
        Component, ComponentError, DerivativeKind, PartialDeclaration, Partials, SlotSpec, Slots,
    };

    /// f = x0² + x1², g = 1 - x0 - x1.
    #[derive(Debug, Default)]
    pub struct Paraboloid;

    impl Component for Paraboloid {
        fn inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("x0", 1.0), SlotSpec::scalar("x1", 1.0)]
        }

        fn outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("f", 0.0), SlotSpec::scalar("g", 0.0)]
        }

        fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
            let (x0, x1) = (inputs.scalar("x0")?, inputs.scalar("x1")?);
            Ok(Slots::new()
                .with("f", x0 * x0 + x1 * x1)
                .with("g", 1.0 - x0 - x1))
        }

        fn linearize(&mut self, inputs: &Slots) -> Result<Option<Partials>, ComponentError> {
            let (x0, x1) = (inputs.scalar("x0")?, inputs.scalar("x1")?);
            let mut partials = Partials::new();
            partials.insert_scalar("f", "x0", 2.0 * x0);
            partials.insert_scalar("f", "x1", 2.0 * x1);
            partials.insert_scalar("g", "x0", -1.0);
            partials.insert_scalar("g", "x1", -1.0);
            Ok(Some(partials))
        }

        fn partial_declarations(&self) -> Vec<PartialDeclaration> {
            ["f", "g"]
                .into_iter()
                .flat_map(|output| {
                    ["x0", "x1"]
                        .map(|input| PartialDeclaration::new(output, input, DerivativeKind::Exact))
                })
                .collect()
        }
    }

    /// f = (x - 2)², undefined beyond `limit`.
    #[derive(Debug)]
    pub struct Fragile {
        pub limit: f64,
    }

    impl Component for Fragile {
        fn inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("x", 1.0)]
        }

        fn outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("f", 0.0)]
        }

        fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
            let x = inputs.scalar("x")?;
            let f = if x > self.limit { f64::NAN } else { (x - 2.0).powi(2) };
            Ok(Slots::new().with("f", f))
        }

        fn linearize(&mut self, inputs: &Slots) -> Result<Option<Partials>, ComponentError> {
            let mut partials = Partials::new();
            partials.insert_scalar("f", "x", 2.0 * (inputs.scalar("x")? - 2.0));
            Ok(Some(partials))
        }
    }
}

pub mod section {
    use std::{
        f64::consts::PI,
        fs, io,
        path::{Path, PathBuf},
    };

    use braid_core::{
        ComponentError, DerivativeKind, PartialDeclaration, Partials, SlotSpec, Slots,
        workdir::{Manifest, Sandboxed, ScopedComponent},
    };

    /// Name of the polar file every section reads from its scratch directory.
    pub const POLAR_FILE: &str = "polar.dat";

    /// Lift-curve slope per radian.
    pub const LIFT_SLOPE: f64 = 2.0 * PI;

    /// Writes a polar file `cd = cd0 + k * cl²` into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_polar(dir: &Path, cd0: f64, k: f64) -> io::Result<PathBuf> {
        let file = dir.join(POLAR_FILE);
        fs::write(&file, format!("{cd0} {k}\n"))?;
        Ok(file)
    }

    /// A blade section at a fixed inflow angle.
    ///
    /// Each call writes an input deck, reads it back together with the
    /// linked polar, and reports thin-airfoil lift and a parabolic drag
    /// polar scaled by chord:
    ///
    /// - `cl = 2π (twist + inflow)`, `cd = cd0 + k cl²`
    /// - `lift = chord * cl`, `drag = chord * cd`
    #[derive(Debug)]
    pub struct SectionPolar {
        pub inflow: f64,
    }

    impl SectionPolar {
        /// Wraps a section at `inflow` in its own scratch directory under `base`.
        #[must_use]
        pub fn sandboxed(base: &Path, name: &str, inflow: f64, polar: &Path) -> Sandboxed<Self> {
            let manifest = Manifest::new(base.join(name)).link(polar);
            Sandboxed::new(Self { inflow }, manifest)
        }

        fn read_case(dir: &Path, inputs: &Slots, inflow: f64) -> Result<Case, ComponentError> {
            let alpha = inputs.scalar("twist")? + inflow;
            fs::write(dir.join("deck.in"), format!("{alpha:e}\n"))?;
            let alpha: f64 = fs::read_to_string(dir.join("deck.in"))?.trim().parse()?;

            let polar = fs::read_to_string(dir.join(POLAR_FILE))?;
            let mut coefficients = polar.split_whitespace().map(str::parse::<f64>);
            let (Some(cd0), Some(k)) = (coefficients.next(), coefficients.next()) else {
                return Err(format!("malformed polar file in {}", dir.display()).into());
            };

            Ok(Case {
                cl: LIFT_SLOPE * alpha,
                cd0: cd0?,
                k: k?,
                chord: inputs.scalar("chord")?,
            })
        }
    }

    struct Case {
        cl: f64,
        cd0: f64,
        k: f64,
        chord: f64,
    }

    impl ScopedComponent for SectionPolar {
        fn inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("twist", 0.0), SlotSpec::scalar("chord", 1.0)]
        }

        fn outputs(&self) -> Vec<SlotSpec> {
            vec![
                SlotSpec::scalar("cl", 0.0),
                SlotSpec::scalar("lift", 0.0),
                SlotSpec::scalar("drag", 0.0),
            ]
        }

        fn evaluate_in(&mut self, dir: &Path, inputs: &Slots) -> Result<Slots, ComponentError> {
            let case = Self::read_case(dir, inputs, self.inflow)?;
            let cd = case.cd0 + case.k * case.cl * case.cl;
            Ok(Slots::new()
                .with("cl", case.cl)
                .with("lift", case.chord * case.cl)
                .with("drag", case.chord * cd))
        }

        fn linearize_in(&mut self, dir: &Path, inputs: &Slots) -> Result<Option<Partials>, ComponentError> {
            let case = Self::read_case(dir, inputs, self.inflow)?;
            let cd = case.cd0 + case.k * case.cl * case.cl;
            let dcd = 2.0 * case.k * case.cl * LIFT_SLOPE;

            let mut partials = Partials::new();
            partials.insert_scalar("cl", "twist", LIFT_SLOPE);
            partials.insert_scalar("lift", "twist", case.chord * LIFT_SLOPE);
            partials.insert_scalar("lift", "chord", case.cl);
            partials.insert_scalar("drag", "twist", case.chord * dcd);
            partials.insert_scalar("drag", "chord", cd);
            Ok(Some(partials))
        }

        fn partial_declarations(&self) -> Vec<PartialDeclaration> {
            vec![
                PartialDeclaration::new("cl", "twist", DerivativeKind::Exact),
                PartialDeclaration::new("lift", "twist", DerivativeKind::Exact),
                PartialDeclaration::new("lift", "chord", DerivativeKind::Exact),
                PartialDeclaration::new("drag", "twist", DerivativeKind::Exact),
                PartialDeclaration::new("drag", "chord", DerivativeKind::Exact),
            ]
        }
    }
}

pub mod rotor {
    use braid_core::{
        Component, ComponentError, DerivativeKind, PartialDeclaration, Partials, SlotSpec, Slots,
        partials::central_difference,
    };

    /// Thrust from sectional lift, `thrust = Σ r_i lift_i`.
    ///
    /// Partials come from central differences of `evaluate`.
    #[derive(Debug)]
    pub struct Rotor {
        pub radii: Vec<f64>,
    }

    impl Component for Rotor {
        fn inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::array("lift", self.radii.len())]
        }

        fn outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("thrust", 0.0)]
        }

        fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
            let lift = inputs.array("lift")?;
            let thrust = self.radii.iter().zip(lift).map(|(r, l)| r * l).sum::<f64>();
            Ok(Slots::new().with("thrust", thrust))
        }

        fn linearize(&mut self, inputs: &Slots) -> Result<Option<Partials>, ComponentError> {
            let block = central_difference(self, inputs, "thrust", "lift", 1e-6)?;
            let mut partials = Partials::new();
            partials.insert("thrust", "lift", block);
            Ok(Some(partials))
        }

        fn partial_declarations(&self) -> Vec<PartialDeclaration> {
            vec![PartialDeclaration::new(
                "thrust",
                "lift",
                DerivativeKind::FiniteDifference,
            )]
        }
    }

    /// Shaft power from sectional lift coefficients.
    ///
    /// Stands in for an analysis without derivatives: it never linearizes
    /// and declares its partials as deliberately zero.
    #[derive(Debug)]
    pub struct BladePower {
        pub stations: usize,
    }

    impl Component for BladePower {
        fn inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::array("cl", self.stations)]
        }

        fn outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("power", 0.0)]
        }

        fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
            let power = inputs.array("cl")?.iter().map(|cl| cl * cl).sum::<f64>();
            Ok(Slots::new().with("power", power))
        }

        fn partial_declarations(&self) -> Vec<PartialDeclaration> {
            vec![PartialDeclaration::new("power", "cl", DerivativeKind::Null)]
        }
    }
}
