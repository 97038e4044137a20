/// Returns whether or not a wrapping number is greater than another
/// sequence_greater_than(2,1) will return true
/// sequence_greater_than(1,2) will return false
/// sequence_greater_than(1,1) will return false
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= 32768)) || ((s1 < s2) && (s2 - s1 > 32768))
}

/// Returns whether or not a wrapping number is less than another
/// sequence_less_than(1,2) will return true
/// sequence_less_than(2,1) will return false
/// sequence_less_than(1,1) will return false
pub fn sequence_less_than(s1: u16, s2: u16) -> bool {
    sequence_greater_than(s2, s1)
}

/// How many steps forward `to` is from `from`, treating both as wrapping
/// sequence numbers. Only meaningful when `to` is not behind `from`.
///
/// # Examples
/// ```
/// # use weave_shared::sequence_distance;
/// assert_eq!(sequence_distance(10, 12), 2);
/// assert_eq!(sequence_distance(65535, 1), 2);
/// ```
pub fn sequence_distance(from: u16, to: u16) -> u16 {
    to.wrapping_sub(from)
}
