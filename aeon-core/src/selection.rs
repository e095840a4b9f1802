//! Choosing the next image to show

use core::fmt::Write as FmtWrite;

use heapless::String;
use log::{info, warn};

use crate::board::RandomSource;
use crate::config::IMAGE_EXTENSION;
use crate::fram::{NvMemory, PersistentState};
use crate::library::ImageLibrary;

/// `<index>.slc`
pub fn image_file_name(index: u32) -> String<16> {
    let mut name = String::new();
    let _ = write!(name, "{}.{}", index, IMAGE_EXTENSION);
    name
}

/// Pick the next image and persist the new image counter.
///
/// Sequential mode shows `<counter>.slc` and wraps to `0.slc` once the
/// expected file is missing. Shuffle mode draws uniformly over the counted
/// files, stepping to the next index when the draw repeats the previous one.
/// A failed draw falls back to sequential order.
pub fn select_next_image<M, L, R>(
    state: &mut PersistentState<M>,
    library: &mut L,
    rng: &mut R,
    shuffle: bool,
) -> Option<String<16>>
where
    M: NvMemory,
    L: ImageLibrary,
    R: RandomSource,
{
    let counter = state.image_counter().unwrap_or_else(|e| {
        warn!("Image counter unreadable ({:?}), starting from 0", e);
        0
    });

    if shuffle {
        match rng.next_u32() {
            Ok(random) => return select_shuffled(state, library, counter, random),
            Err(e) => warn!("RNG failed ({:?}), using sequential order", e),
        }
    }
    select_sequential(state, library, counter)
}

fn select_sequential<M: NvMemory, L: ImageLibrary>(
    state: &mut PersistentState<M>,
    library: &mut L,
    counter: u32,
) -> Option<String<16>> {
    let name = image_file_name(counter);
    match library.exists(&name) {
        Ok(true) => {
            store_counter(state, counter.wrapping_add(1));
            Some(name)
        }
        Ok(false) => {
            info!("{} missing, wrapping to first image", name);
            store_counter(state, 1);
            let first = image_file_name(0);
            match library.exists(&first) {
                Ok(true) => Some(first),
                Ok(false) => None,
                Err(e) => {
                    warn!("Image lookup failed: {:?}", e);
                    None
                }
            }
        }
        Err(e) => {
            warn!("Image lookup failed: {:?}", e);
            None
        }
    }
}

fn select_shuffled<M: NvMemory, L: ImageLibrary>(
    state: &mut PersistentState<M>,
    library: &mut L,
    previous: u32,
    random: u32,
) -> Option<String<16>> {
    let count = match library.count() {
        Ok(0) => return None,
        Ok(count) => count,
        Err(e) => {
            warn!("Image count failed: {:?}", e);
            return None;
        }
    };

    let mut index = random % count;
    if index == previous {
        index = (index + 1) % count;
    }
    store_counter(state, index);
    Some(image_file_name(index))
}

fn store_counter<M: NvMemory>(state: &mut PersistentState<M>, counter: u32) {
    if let Err(e) = state.set_image_counter(counter) {
        warn!("Image counter not saved: {:?}", e);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::board::SensorFault;
    use crate::fram::MemFram;
    use crate::library::tests::MemLibrary;

    struct Script(VecDeque<Result<u32, SensorFault>>);

    impl Script {
        fn new(values: &[Result<u32, SensorFault>]) -> Self {
            Self(values.iter().copied().collect())
        }
    }

    impl RandomSource for Script {
        fn next_u32(&mut self) -> Result<u32, SensorFault> {
            self.0.pop_front().unwrap_or(Err(SensorFault))
        }
    }

    fn state_with_counter(counter: u32) -> PersistentState<MemFram> {
        let mut state = PersistentState::new(MemFram::new());
        state.set_image_counter(counter).unwrap();
        state
    }

    #[test]
    fn test_sequential_advances_then_wraps() {
        let mut library = MemLibrary::numbered(5);
        let mut state = state_with_counter(4);
        let mut rng = Script::new(&[]);

        let name = select_next_image(&mut state, &mut library, &mut rng, false);
        assert_eq!(name.as_deref(), Some("4.slc"));
        assert_eq!(state.image_counter().unwrap(), 5);

        let name = select_next_image(&mut state, &mut library, &mut rng, false);
        assert_eq!(name.as_deref(), Some("0.slc"));
        assert_eq!(state.image_counter().unwrap(), 1);

        let name = select_next_image(&mut state, &mut library, &mut rng, false);
        assert_eq!(name.as_deref(), Some("1.slc"));
    }

    #[test]
    fn test_sequential_without_first_image() {
        let mut library = MemLibrary::with_files([("3.slc".to_string(), Vec::new())]);
        let mut state = state_with_counter(7);
        let name = select_next_image(&mut state, &mut library, &mut Script::new(&[]), false);
        assert_eq!(name, None);
        assert_eq!(state.image_counter().unwrap(), 1);
    }

    #[test]
    fn test_sequential_lookup_error() {
        let mut library = MemLibrary::numbered(3);
        library.fail_exists = true;
        let mut state = state_with_counter(1);
        let name = select_next_image(&mut state, &mut library, &mut Script::new(&[]), false);
        assert_eq!(name, None);
        assert_eq!(state.image_counter().unwrap(), 1);
    }

    #[test]
    fn test_shuffle_draws_modulo_count() {
        let mut library = MemLibrary::numbered(5);
        library.mount().unwrap();
        let mut state = state_with_counter(0);
        let name = select_next_image(&mut state, &mut library, &mut Script::new(&[Ok(7)]), true);
        assert_eq!(name.as_deref(), Some("2.slc"));
        assert_eq!(state.image_counter().unwrap(), 2);
    }

    #[test]
    fn test_shuffle_skips_previous_image() {
        let mut library = MemLibrary::numbered(5);
        library.mount().unwrap();
        let mut state = state_with_counter(4);
        let name = select_next_image(&mut state, &mut library, &mut Script::new(&[Ok(9)]), true);
        assert_eq!(name.as_deref(), Some("0.slc"));
        assert_eq!(state.image_counter().unwrap(), 0);
    }

    #[test]
    fn test_shuffle_empty_directory() {
        let mut library = MemLibrary::numbered(0);
        library.mount().unwrap();
        let mut state = state_with_counter(0);
        let name = select_next_image(&mut state, &mut library, &mut Script::new(&[Ok(3)]), true);
        assert_eq!(name, None);
    }

    #[test]
    fn test_shuffle_rng_failure_falls_back_to_sequential() {
        let mut library = MemLibrary::numbered(5);
        library.mount().unwrap();
        let mut state = state_with_counter(2);
        let mut rng = Script::new(&[Err(SensorFault)]);
        let name = select_next_image(&mut state, &mut library, &mut rng, true);
        assert_eq!(name.as_deref(), Some("2.slc"));
        assert_eq!(state.image_counter().unwrap(), 3);
    }

    /// Known bias: only the previous index is excluded, so an image shown two
    /// cycles ago can come straight back.
    #[test]
    fn test_shuffle_known_bias_repeats_older_image() {
        let mut library = MemLibrary::numbered(3);
        library.mount().unwrap();
        let mut state = state_with_counter(0);
        let mut rng = Script::new(&[Ok(1), Ok(0)]);

        let first = select_next_image(&mut state, &mut library, &mut rng, true);
        let second = select_next_image(&mut state, &mut library, &mut rng, true);
        assert_eq!(first.as_deref(), Some("1.slc"));
        assert_eq!(second.as_deref(), Some("0.slc"));
        let third = select_next_image(&mut state, &mut library, &mut Script::new(&[Ok(1)]), true);
        assert_eq!(third.as_deref(), Some("1.slc"));
    }

    /// Known bias: the index after the previous one takes the previous
    /// index's share of draws.
    #[test]
    fn test_shuffle_known_bias_favours_next_index() {
        let mut hits = [0u32; 4];
        for random in 0..4 {
            let mut library = MemLibrary::numbered(4);
            library.mount().unwrap();
            let mut state = state_with_counter(1);
            let mut rng = Script::new(&[Ok(random)]);
            select_next_image(&mut state, &mut library, &mut rng, true);
            hits[state.image_counter().unwrap() as usize] += 1;
        }
        assert_eq!(hits, [1, 0, 2, 1]);
    }
}
