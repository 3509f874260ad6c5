extern crate tiersolve;

use tiersolve::cursor::TierCursor;
use tiersolve::games::TicTacToe;
use tiersolve::tier::TierIndex;

// Walks one tic-tac-toe tier in rank order and prints every position with
// the slots that changed since the previous one.
//
// Usage: enumerate [tier] [limit]
fn main() -> Result<(), tiersolve::Error> {
    let mut args = std::env::args().skip(1);
    let tier: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(3);
    let limit: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(u64::MAX);

    let game = TicTacToe::default();
    let index = TierIndex::for_game(&game)?;
    println!(
        "tier {tier}: {} positions from address {}",
        index.tier_size(tier)?,
        index.tier_offset(tier)?
    );

    let mut cursor = TierCursor::new(&index, tier)?;
    let mut changed: Vec<usize> = Vec::new();
    let mut steps = 0u64;
    loop {
        println!(
            "{:>6} [{}] changed {:?}",
            cursor.address(),
            index.board_to_string(cursor.board()),
            changed
        );
        steps += 1;
        if steps >= limit {
            break;
        }
        match cursor.next() {
            Some(slots) => {
                changed.clear();
                changed.extend_from_slice(slots);
            }
            None => break,
        }
    }

    let sum: usize = (0..index.num_tiers())
        .map(|t| index.signatures(t).map(|s| s.len()).unwrap_or(0))
        .sum();
    println!("{} tiers, {} signatures, {} addresses", index.num_tiers(), sum, index.total());
    Ok(())
}
