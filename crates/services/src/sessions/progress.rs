/// Aggregated view of an attempt in flight, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptProgress {
    pub total: u32,
    pub answered: u32,
    pub remaining: u32,
    /// Global number of the question under the cursor.
    pub current_number: Option<u32>,
    pub elapsed: u32,
    /// `None` for count-up attempts.
    pub time_remaining: Option<u32>,
    pub is_paused: bool,
    pub checkpoint_pending: bool,
    pub is_finished: bool,
}
