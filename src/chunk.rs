//! The unit of work handed from a work source to a task.

/// One unit of work data. Carries a single payload and nothing else.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Chunk<T> {
    data: T,
}

impl<T> Chunk<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }

    #[inline]
    pub fn data(&self) -> &T {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    /// Replace the payload before the chunk is handed to a task.
    pub fn set_data(&mut self, data: T) {
        self.data = data;
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T> From<T> for Chunk<T> {
    fn from(data: T) -> Self {
        Self::new(data)
    }
}
