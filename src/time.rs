use std::time::Instant;

/// Milliseconds elapsed from `start` to `end`, truncated to the 32-bit
/// space used by IAX2 timestamps. `start` and `end` swapped yields 0.
pub fn diff_ms(end: Instant, start: Instant) -> u32 {
    end.saturating_duration_since(start).as_millis() as u32
}

/// Milliseconds elapsed since `start`, truncated to 32 bits.
pub fn elapsed_ms(start: Instant) -> u32 {
    diff_ms(Instant::now(), start)
}

#[test]
fn test_diff_ms() {
    use std::time::Duration;
    let now = Instant::now();
    assert_eq!(diff_ms(now + Duration::from_millis(1500), now), 1500);
    // negative intervals clamp to zero
    assert_eq!(diff_ms(now, now + Duration::from_millis(10)), 0);
}
