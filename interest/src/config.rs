/// Configuration for the [crate::Engine].
#[derive(Clone, Debug)]
pub struct Config<C> {
    /// Passed to every decoder the engine creates for a coded parent.
    pub decoder: C,

    /// Prefix under which the engine registers its metrics.
    pub metrics_prefix: String,
}

impl<C: Default> Default for Config<C> {
    fn default() -> Self {
        Self {
            decoder: C::default(),
            metrics_prefix: "interest".to_string(),
        }
    }
}
