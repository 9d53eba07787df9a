/// Returns the timestamp to write for the next heartbeat.
///
/// Never goes below the previously written value, so a wall clock stepping
/// backwards cannot make the heartbeat key move back in time.
pub fn next_heartbeat(previous: Option<i64>, now_millis: i64) -> i64 {
    previous.map_or(now_millis, |previous| previous.max(now_millis))
}
