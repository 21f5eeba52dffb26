use hdesk_core::{
    ChannelName, Envelope, History, MessageContent, ParticipantKind, Timetoken, channel_name,
    create_message,
};
use proptest::prelude::*;

fn envelope(sender: u8, tt: u64) -> Envelope {
    let sender = if sender % 2 == 0 {
        ChannelName::client(sender.to_string())
    } else {
        ChannelName::user(sender.to_string())
    };
    create_message("room-1", MessageContent::text(format!("at {tt}")), sender)
        .confirm(Timetoken::new(tt))
}

fn timetokens(history: &History) -> Vec<u64> {
    history
        .iter()
        .filter_map(|e| e.timetoken.map(|t| t.as_u64()))
        .collect()
}

proptest! {
    #[test]
    fn channel_name_concatenates(kind in prop::sample::select(ParticipantKind::ALL.to_vec()), id in "[a-z0-9#_-]{0,16}") {
        let name = channel_name(kind.as_str(), &id).unwrap();
        prop_assert_eq!(name.as_str(), format!("{}#{}", kind.as_str(), id));
    }

    #[test]
    fn channel_name_rejects_other_kinds(kind in "[a-z]{1,10}") {
        prop_assume!(!["client", "user", "room", "faculty"].contains(&kind.as_str()));
        prop_assert!(channel_name(&kind, "1").is_err());
    }

    #[test]
    fn append_keeps_sorted(items in prop::collection::vec((0u8..4, 0u64..50), 0..40)) {
        let mut history = History::new();
        for (sender, tt) in &items {
            history.append(envelope(*sender, *tt)).unwrap();
        }
        let tts = timetokens(&history);
        let mut sorted = tts.clone();
        sorted.sort_unstable();
        prop_assert_eq!(tts, sorted);
    }

    #[test]
    fn append_is_idempotent(items in prop::collection::vec((0u8..4, 0u64..50), 0..40)) {
        let mut once = History::new();
        let mut twice = History::new();
        for (sender, tt) in &items {
            once.append(envelope(*sender, *tt)).unwrap();
            twice.append(envelope(*sender, *tt)).unwrap();
            twice.append(envelope(*sender, *tt)).unwrap();
        }
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn insertion_order_does_not_matter(items in prop::collection::vec((0u8..4, 0u64..50), 0..40)) {
        let mut forward = History::new();
        let mut backward = History::new();
        for (sender, tt) in &items {
            forward.append(envelope(*sender, *tt)).unwrap();
        }
        for (sender, tt) in items.iter().rev() {
            backward.append(envelope(*sender, *tt)).unwrap();
        }
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn messages_since_is_exact(items in prop::collection::vec((0u8..4, 0u64..50), 1..40), pivot in 0u64..60) {
        let mut history = History::new();
        for (sender, tt) in &items {
            history.append(envelope(*sender, *tt)).unwrap();
        }
        let since: Vec<u64> = history
            .messages_since(Timetoken::new(pivot))
            .filter_map(|e| e.timetoken.map(|t| t.as_u64()))
            .collect();
        let expected: Vec<u64> = timetokens(&history).into_iter().filter(|tt| *tt > pivot).collect();
        prop_assert_eq!(since, expected);

        let max = history.latest().and_then(|e| e.timetoken).unwrap();
        prop_assert_eq!(history.messages_since(max).count(), 0);
    }
}
