//! Diagnostic rules, the severities they can be set to, and filter tables.
//!
//! <https://www.w3.org/TR/WGSL/#diagnostic-filtering>

use crate::{FastHashMap, Span};

use indexmap::IndexMap;

/// A severity set by a `diagnostic(...)` directive or attribute.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Severity {
    Off,
    Info,
    Warning,
    Error,
}

impl Severity {
    const ERROR: &'static str = "error";
    const WARNING: &'static str = "warning";
    const INFO: &'static str = "info";
    const OFF: &'static str = "off";

    /// Every severity name, in the order suggestions list them.
    pub const NAMES: &'static [&'static str] = &[Self::ERROR, Self::INFO, Self::OFF, Self::WARNING];

    /// Convert from a sentinel word in WGSL into its associated [`Severity`], if possible.
    pub fn from_ident(s: &str) -> Option<Self> {
        Some(match s {
            Self::ERROR => Self::Error,
            Self::WARNING => Self::Warning,
            Self::INFO => Self::Info,
            Self::OFF => Self::Off,
            _ => return None,
        })
    }

    pub const fn to_ident(self) -> &'static str {
        match self {
            Self::Error => Self::ERROR,
            Self::Warning => Self::WARNING,
            Self::Info => Self::INFO,
            Self::Off => Self::OFF,
        }
    }

    /// The severity a triggered rule is reported with, or `None` when the
    /// rule is switched off.
    pub const fn to_diagnostic_severity(self) -> Option<super::Severity> {
        match self {
            Self::Off => None,
            Self::Info => Some(super::Severity::Note),
            Self::Warning => Some(super::Severity::Warning),
            Self::Error => Some(super::Severity::Error),
        }
    }
}

/// A rule this crate knows how to trigger.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Rule {
    /// `derivative_uniformity`: derivatives computed in non-uniform control flow.
    DerivativeUniformity,
    /// `chromium.unreachable_code`: statements after a `return`, `break` and so on.
    UnreachableCode,
}

impl Rule {
    pub const ALL: &'static [Self] = &[Self::DerivativeUniformity, Self::UnreachableCode];

    pub const fn category(self) -> Option<&'static str> {
        match self {
            Self::DerivativeUniformity => None,
            Self::UnreachableCode => Some(CHROMIUM),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::DerivativeUniformity => "derivative_uniformity",
            Self::UnreachableCode => "unreachable_code",
        }
    }

    pub const fn default_severity(self) -> Severity {
        match self {
            Self::DerivativeUniformity => Severity::Error,
            Self::UnreachableCode => Severity::Warning,
        }
    }

    /// The rule's name as written in WGSL, `category.name` or `name`.
    pub fn full_name(self) -> String {
        match self.category() {
            Some(category) => format!("{category}.{}", self.name()),
            None => self.name().to_string(),
        }
    }
}

const CHROMIUM: &str = "chromium";

/// What a rule name written in source refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    Known(Rule),
    /// A name in a namespace this crate owns (`core` or `chromium`) that
    /// matches no rule. Worth a warning.
    Unrecognized {
        /// The rules of the same namespace, for suggestions.
        candidates: &'static [Rule],
    },
    /// A name in some other tool's namespace. Silently accepted.
    Foreign,
}

/// Classify a rule name of the form `name` or `category.name`.
pub fn lookup(category: Option<&str>, name: &str) -> Lookup {
    const CORE_RULES: &[Rule] = &[Rule::DerivativeUniformity];
    const CHROMIUM_RULES: &[Rule] = &[Rule::UnreachableCode];

    let candidates = match category {
        None => CORE_RULES,
        Some(CHROMIUM) => CHROMIUM_RULES,
        Some(_) => return Lookup::Foreign,
    };
    match candidates.iter().find(|rule| rule.name() == name) {
        Some(&rule) => Lookup::Known(rule),
        None => Lookup::Unrecognized { candidates },
    }
}

/// A `category.name` pair as written in source, used as a map key so that
/// unknown rules still participate in conflict detection.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RuleKey {
    pub category: Option<String>,
    pub name: String,
}

impl RuleKey {
    pub fn new(category: Option<&str>, name: &str) -> Self {
        RuleKey {
            category: category.map(str::to_string),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.category {
            Some(ref category) => write!(f, "{category}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A map of diagnostic filters to their severity and first occurrence's span.
///
/// Used to collect the filters of one directive list or one attribute list,
/// rejecting two filters that set one rule to different severities.
#[derive(Clone, Debug, Default)]
pub struct FilterMap(IndexMap<RuleKey, (Severity, Span)>);

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the given filter parsed at the given `span` to this map.
    pub fn add(
        &mut self,
        key: RuleKey,
        severity: Severity,
        span: Span,
    ) -> Result<(), ConflictingRuleError> {
        use indexmap::map::Entry;

        match self.0.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert((severity, span));
                Ok(())
            }
            Entry::Occupied(entry) => {
                let &(previous, previous_span) = entry.get();
                if previous == severity {
                    Ok(())
                } else {
                    Err(ConflictingRuleError {
                        rule: entry.key().clone(),
                        previous,
                        spans: [previous_span, span],
                    })
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RuleKey, Severity, Span)> {
        self.0.iter().map(|(key, &(severity, span))| (key, severity, span))
    }

    /// Severities for the rules this crate knows, ignoring unknown names.
    pub fn known(&self) -> SeverityTable {
        let mut table = SeverityTable::empty();
        for (key, severity, _) in self.iter() {
            if let Lookup::Known(rule) = lookup(key.category.as_deref(), &key.name) {
                table.set(rule, severity);
            }
        }
        table
    }
}

/// An error yielded by [`FilterMap::add`].
#[derive(Clone, Debug, PartialEq)]
pub struct ConflictingRuleError {
    pub rule: RuleKey,
    /// The severity the first filter set.
    pub previous: Severity,
    /// Spans of the first filter and the conflicting one.
    pub spans: [Span; 2],
}

/// Rule severities for one scope. Missing entries defer to the outer scope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SeverityTable(FastHashMap<Rule, Severity>);

impl SeverityTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The compiled-in defaults, used as the outermost scope.
    pub fn defaults() -> Self {
        let mut table = Self::empty();
        for &rule in Rule::ALL {
            table.set(rule, rule.default_severity());
        }
        table
    }

    pub fn set(&mut self, rule: Rule, severity: Severity) {
        self.0.insert(rule, severity);
    }

    pub fn get(&self, rule: Rule) -> Option<Severity> {
        self.0.get(&rule).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A chain of [`SeverityTable`]s from the innermost scope outwards.
///
/// Lookups take the innermost table that mentions the rule, falling back to
/// the rule's default.
#[derive(Clone, Copy, Debug)]
pub struct ScopeChain<'a> {
    table: &'a SeverityTable,
    parent: Option<&'a ScopeChain<'a>>,
}

impl<'a> ScopeChain<'a> {
    pub const fn root(table: &'a SeverityTable) -> Self {
        ScopeChain {
            table,
            parent: None,
        }
    }

    pub const fn push(&'a self, table: &'a SeverityTable) -> ScopeChain<'a> {
        ScopeChain {
            table,
            parent: Some(self),
        }
    }

    pub fn severity(&self, rule: Rule) -> Severity {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(severity) = current.table.get(rule) {
                return severity;
            }
            scope = current.parent;
        }
        rule.default_severity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_namespaces() {
        assert_eq!(
            lookup(None, "derivative_uniformity"),
            Lookup::Known(Rule::DerivativeUniformity)
        );
        assert_eq!(
            lookup(Some("chromium"), "unreachable_code"),
            Lookup::Known(Rule::UnreachableCode)
        );
        assert!(matches!(
            lookup(Some("chromium"), "unreachable_cod"),
            Lookup::Unrecognized { .. }
        ));
        assert_eq!(lookup(Some("tint"), "anything"), Lookup::Foreign);
    }

    #[test]
    fn same_severity_is_not_a_conflict() {
        let mut map = FilterMap::new();
        let key = RuleKey::new(Some("chromium"), "unreachable_code");
        map.add(key.clone(), Severity::Error, Span::new(1, 2)).unwrap();
        map.add(key.clone(), Severity::Error, Span::new(3, 4)).unwrap();
        let err = map.add(key, Severity::Off, Span::new(5, 6)).unwrap_err();
        assert_eq!(err.previous, Severity::Error);
        assert_eq!(err.spans, [Span::new(1, 2), Span::new(5, 6)]);
    }

    #[test]
    fn innermost_scope_wins() {
        let module = SeverityTable::defaults();
        let mut function = SeverityTable::empty();
        function.set(Rule::UnreachableCode, Severity::Off);
        let mut block = SeverityTable::empty();
        block.set(Rule::UnreachableCode, Severity::Info);

        let root = ScopeChain::root(&module);
        let inner = root.push(&function);
        assert_eq!(inner.severity(Rule::UnreachableCode), Severity::Off);
        assert_eq!(
            inner.severity(Rule::DerivativeUniformity),
            Severity::Error
        );
        let innermost = inner.push(&block);
        assert_eq!(innermost.severity(Rule::UnreachableCode), Severity::Info);
    }
}
