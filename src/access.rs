use core::fmt::Debug;

/// Static properties of an access kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AccessProperties {
    /// The access never mutates the data behind the handle.
    pub readonly: bool,
    /// Consecutive accesses of this kind may be applied in any order and
    /// therefore share one version.
    pub commutative: bool,
    /// Two accesses of this kind must not overlap in time.
    pub exclusive: bool,
}

impl AccessProperties {
    /// Properties of a plain read.
    pub const READ: Self = Self {
        readonly: true,
        commutative: true,
        exclusive: false,
    };
    /// Properties of a plain write.
    pub const WRITE: Self = Self {
        readonly: false,
        commutative: false,
        exclusive: true,
    };
    /// Properties of an associative accumulation (`+=`, `*=`, ...).
    pub const ACCUMULATE: Self = Self {
        readonly: false,
        commutative: true,
        exclusive: true,
    };

    /// Accesses of this kind share a version but must not run concurrently,
    /// so they are serialized through the handle lock.
    #[must_use]
    pub const fn needs_lock(self) -> bool {
        self.exclusive && self.commutative
    }

    /// Accesses of this kind sharing a version may run fully in parallel.
    #[must_use]
    pub const fn concurrent_safe(self) -> bool {
        self.commutative && !self.exclusive
    }
}

/// A closed set of access kinds used by one runtime configuration.
///
/// Implement this on a fieldless enum to define a custom set. Each kind only
/// has to describe itself through [`AccessKind::properties`]; all scheduling
/// decisions are derived from those three flags.
///
/// ```
/// use vtg::access::{AccessKind, AccessProperties};
///
/// #[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// enum Matrix {
///     Read,
///     Write,
///     Add,
///     Mul,
/// }
///
/// impl AccessKind for Matrix {
///     const ALL: &'static [Self] = &[Self::Read, Self::Write, Self::Add, Self::Mul];
///
///     fn properties(self) -> AccessProperties {
///         match self {
///             Self::Read => AccessProperties::READ,
///             Self::Write => AccessProperties::WRITE,
///             Self::Add | Self::Mul => AccessProperties::ACCUMULATE,
///         }
///     }
/// }
///
/// assert!(Matrix::Mul.needs_lock());
/// assert_eq!(Matrix::Mul.index(), 3);
/// ```
pub trait AccessKind: Copy + Eq + Debug + Send + Sync + 'static {
    /// Every kind of the set. The position of a kind in this table is its
    /// [`index`](AccessKind::index) unless `index` is overridden.
    const ALL: &'static [Self];

    /// Static properties of this kind.
    fn properties(self) -> AccessProperties;

    /// Dense index of this kind in `0..ALL.len()`.
    ///
    /// # Panics
    /// If the kind is missing from [`AccessKind::ALL`].
    fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|kind| *kind == self)
            .expect("AccessKind::index: kind is missing from AccessKind::ALL")
    }

    /// See [`AccessProperties::readonly`].
    fn readonly(self) -> bool {
        self.properties().readonly
    }

    /// See [`AccessProperties::commutative`].
    fn commutative(self) -> bool {
        self.properties().commutative
    }

    /// See [`AccessProperties::exclusive`].
    fn exclusive(self) -> bool {
        self.properties().exclusive
    }

    /// See [`AccessProperties::needs_lock`].
    fn needs_lock(self) -> bool {
        self.properties().needs_lock()
    }

    /// See [`AccessProperties::concurrent_safe`].
    fn concurrent_safe(self) -> bool {
        self.properties().concurrent_safe()
    }
}

/// The built-in access kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Access {
    /// Shared read. Runs concurrently with other reads of the same version.
    Read,
    /// Exclusive, ordered write.
    Write,
    /// Commutative accumulation. Runs one at a time, in any order, with other
    /// `Add` accesses of the same version.
    Add,
}

impl AccessKind for Access {
    const ALL: &'static [Self] = &[Self::Read, Self::Write, Self::Add];

    fn properties(self) -> AccessProperties {
        match self {
            Self::Read => AccessProperties::READ,
            Self::Write => AccessProperties::WRITE,
            Self::Add => AccessProperties::ACCUMULATE,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Check that a kind set is well-formed.
///
/// # Panics
/// - If the set is empty.
/// - If a kind is readonly but not commutative, or readonly and exclusive.
/// - If `index()` is not a bijection onto `0..ALL.len()`.
pub fn validate<K: AccessKind>() {
    assert!(!K::ALL.is_empty(), "access kind set is empty");
    let mut seen = vec![false; K::ALL.len()];
    for &kind in K::ALL {
        let props = kind.properties();
        assert!(
            !props.readonly || props.commutative,
            "access kind {kind:?} is readonly but not commutative"
        );
        assert!(
            !props.readonly || !props.exclusive,
            "access kind {kind:?} is readonly and exclusive"
        );
        let index = kind.index();
        assert!(
            index < seen.len(),
            "access kind {kind:?} has index {index} outside of 0..{}",
            seen.len()
        );
        assert!(
            !seen[index],
            "access kind {kind:?} shares index {index} with another kind"
        );
        seen[index] = true;
    }
}
