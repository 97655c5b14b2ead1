use crate::FastHashSet;

/// Hands out WGSL identifiers that are valid and distinct from each other
/// and from every keyword and builtin.
#[derive(Debug, Default)]
pub(super) struct Namer {
    taken: FastHashSet<String>,
}

impl Namer {
    /// A namer that will never produce any of `reserved`.
    pub fn new<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        Namer {
            taken: reserved.into_iter().map(str::to_string).collect(),
        }
    }

    /// Turn an arbitrary debug name into something WGSL accepts as an
    /// identifier.
    pub fn sanitize(label: &str) -> String {
        let mut base = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect::<String>();
        if base.is_empty() || base == "_" {
            base = "empty".to_string();
        }
        if base.starts_with(|c: char| c.is_ascii_digit()) {
            base.insert_str(0, "x_");
        } else if base.starts_with("__") {
            base.insert(0, 'x');
        }
        base
    }

    /// A fresh identifier derived from `label`.
    pub fn call(&mut self, label: &str) -> String {
        let base = Self::sanitize(label);
        if self.taken.insert(base.clone()) {
            return base;
        }
        let mut suffix = 1u32;
        loop {
            let candidate = format!("{base}_{suffix}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Namer;

    #[test]
    fn sanitize() {
        assert_eq!(Namer::sanitize("main"), "main");
        assert_eq!(Namer::sanitize("a.b[0]"), "a_b_0_");
        assert_eq!(Namer::sanitize("2d"), "x_2d");
        assert_eq!(Namer::sanitize("__x"), "x__x");
        assert_eq!(Namer::sanitize(""), "empty");
    }

    #[test]
    fn unique() {
        let mut namer = Namer::new(["loop", "vec4f"]);
        assert_eq!(namer.call("value"), "value");
        assert_eq!(namer.call("value"), "value_1");
        assert_eq!(namer.call("value"), "value_2");
        assert_eq!(namer.call("loop"), "loop_1");
        assert_eq!(namer.call("vec4f"), "vec4f_1");
        assert_eq!(namer.call("value_2"), "value_2_1");
    }
}
