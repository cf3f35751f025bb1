use std::sync::Arc;
use std::time::Duration;

use sphere_chat_core::MockWallet;

pub const SELF_KEY: &str = "02f3c1a9d27e4b6850c1e2d3f4a5b6c7d8e9f0a1b2c3d4e5f60718293a4b5c6d7e";

const ALICE: &str = "03a11ce0b7e25d4c8f9a6b3e2d1c0f9e8d7c6b5a4f3e2d1c0b9a8f7e6d5c4b3a2f";
const BOB: &str = "0290b0b5f1e2d3c4b5a69788796a5b4c3d2e1f0a9b8c7d6e5f4a3b2c1d0e9f8a7b";
const CAROL: &str = "03ca201a8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3b2a1f0e9d8c7b6a5f4e3d2c1b0a";
const UNNAMED: &str = "02be5e1ec7ed0000111122223333444455556666777788889999aaaabbbbccccdd";

/// A wallet with a few peers and enough history to page through.
pub fn demo_wallet(self_tag: Option<&str>, page_delay: Duration) -> Arc<MockWallet> {
    let wallet = MockWallet::new(SELF_KEY, self_tag);
    wallet.register_peer(ALICE, Some("alice"));
    wallet.register_peer(BOB, Some("bob"));
    wallet.register_peer(CAROL, Some("carol"));
    wallet.register_peer(UNNAMED, None);

    for i in 0..45 {
        if i % 3 == 0 {
            wallet.seed(SELF_KEY, ALICE, &format!("alice thread, note {i}"), true);
        } else {
            wallet.seed(ALICE, SELF_KEY, &format!("alice thread, note {i}"), true);
        }
    }
    wallet.seed(BOB, SELF_KEY, "hey, are you around?", false);
    wallet.seed(BOB, SELF_KEY, "sent you the invoice", false);
    wallet.seed(BOB, SELF_KEY, "ping me when it clears", false);
    wallet.seed(UNNAMED, SELF_KEY, "who dis", false);

    if !page_delay.is_zero() {
        for peer in [ALICE, BOB, CAROL, UNNAMED] {
            wallet.set_page_delay(peer, page_delay);
        }
    }
    wallet
}
