//! Kademlia routing table as a binary trie of k-buckets.
//!
//! Buckets live in an arena and refer to each other by [BucketId]. Inner
//! buckets hold no contacts; leaves are threaded in identifier order through
//! `prev`/`next` links, which [RoutingTable::find_closest] walks outwards.

use std::slice::Iter;

use tracing::trace;

use crate::common::{Contact, Id, ID_BITS};

/// K = the default maximum size of a k-bucket.
pub const DEFAULT_BUCKET_SIZE_K: usize = 20;

const ROOT: BucketId = BucketId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Index of a [Bucket] in the routing table arena.
pub struct BucketId(usize);

#[derive(Debug, Clone)]
/// A node of the routing trie.
pub struct Bucket {
    depth: usize,
    /// Only the first `depth` bits are meaningful.
    prefix: Id,
    /// Contacts sorted by the least recently seen.
    contacts: Vec<Contact>,
    /// Child for ids whose bit at `depth` is 1.
    left: Option<BucketId>,
    /// Child for ids whose bit at `depth` is 0.
    right: Option<BucketId>,
    prev: Option<BucketId>,
    next: Option<BucketId>,
}

impl Bucket {
    fn new(depth: usize, prefix: Id, contacts: Vec<Contact>) -> Self {
        Bucket {
            depth,
            prefix,
            contacts,
            left: None,
            right: None,
            prev: None,
            next: None,
        }
    }

    // === Getters ===

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn prefix(&self) -> &Id {
        &self.prefix
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    pub fn iter(&self) -> Iter<'_, Contact> {
        self.contacts.iter()
    }

    fn child(&self, bit: u8) -> Option<BucketId> {
        if bit == 1 {
            self.left
        } else {
            self.right
        }
    }
}

#[derive(Debug, Clone)]
/// Kademlia routing table owned by the node with Id [RoutingTable::id].
pub struct RoutingTable {
    id: Id,
    k: usize,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    /// Create a new [RoutingTable] for the owner `id`, with buckets of capacity `k`.
    pub fn new(id: Id, k: usize) -> Self {
        RoutingTable {
            id,
            k: k.max(1),
            buckets: vec![Bucket::new(0, Id::MIN, Vec::with_capacity(k))],
        }
    }

    // === Getters ===

    /// Returns the [Id] of the owner of this table.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Returns the bucket capacity.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn bucket(&self, bucket: BucketId) -> &Bucket {
        &self.buckets[bucket.0]
    }

    pub fn root(&self) -> &Bucket {
        self.bucket(ROOT)
    }

    pub fn left(&self, bucket: BucketId) -> Option<BucketId> {
        self.bucket(bucket).left
    }

    pub fn right(&self, bucket: BucketId) -> Option<BucketId> {
        self.bucket(bucket).right
    }

    // === Public Methods ===

    /// Returns the leaf bucket governing `id`.
    ///
    /// # Panics
    ///
    /// Panics if all the bits of `id` are exhausted without reaching a leaf,
    /// which [Self::split] never allows.
    pub fn find(&self, id: &Id) -> BucketId {
        let mut current = ROOT;

        for bit in id.bits() {
            match self.bucket(current).child(bit) {
                Some(child) => current = child,
                None => return current,
            }
        }

        if self.bucket(current).is_leaf() {
            return current;
        }

        panic!("Exhausted key space without coming to a leaf of the tree: {id}");
    }

    /// Attempts to add a contact to this routing table, and return `true` if it did.
    ///
    /// A full bucket is split only if it lies on the path to the owner's own
    /// Id; otherwise, or if the split would put every contact on one side,
    /// the contact is dropped.
    pub fn insert(&mut self, contact: Contact) -> bool {
        if contact.id == self.id {
            return false;
        }

        let mut current = self.find(&contact.id);

        loop {
            let bucket = &mut self.buckets[current.0];

            if bucket.contacts.len() < self.k {
                bucket.contacts.push(contact);
                return true;
            }

            if !self.id.has_prefix(&bucket.prefix, bucket.depth) {
                trace!(?contact, depth = bucket.depth, "Dropped contact, bucket is full");
                return false;
            }

            if !self.split(current) {
                return false;
            }

            current = self.find(&contact.id);
        }
    }

    /// Split a full leaf in two children by the bit at the leaf's depth,
    /// returning `false` if either child would be empty.
    pub fn split(&mut self, bucket: BucketId) -> bool {
        let parent = &self.buckets[bucket.0];

        if !parent.is_leaf() || parent.depth >= ID_BITS {
            return false;
        }

        let depth = parent.depth;

        let (left_contacts, right_contacts): (Vec<Contact>, Vec<Contact>) = parent
            .contacts
            .iter()
            .copied()
            .partition(|contact| contact.id.bit(depth) == 1);

        if left_contacts.is_empty() || right_contacts.is_empty() {
            trace!(depth, "All contacts are on one side of the pivot, cannot split");
            return false;
        }

        let left_prefix = parent.prefix.with_bit(depth, 1);
        let right_prefix = parent.prefix.with_bit(depth, 0);
        let (prev, next) = (parent.prev, parent.next);

        let left = BucketId(self.buckets.len());
        let right = BucketId(self.buckets.len() + 1);

        let mut left_bucket = Bucket::new(depth + 1, left_prefix, left_contacts);
        left_bucket.prev = prev;
        left_bucket.next = Some(right);

        let mut right_bucket = Bucket::new(depth + 1, right_prefix, right_contacts);
        right_bucket.prev = Some(left);
        right_bucket.next = next;

        self.buckets.push(left_bucket);
        self.buckets.push(right_bucket);

        if let Some(prev) = prev {
            self.buckets[prev.0].next = Some(left);
        }
        if let Some(next) = next {
            self.buckets[next.0].prev = Some(right);
        }

        let parent = &mut self.buckets[bucket.0];
        parent.contacts = Vec::new();
        parent.left = Some(left);
        parent.right = Some(right);
        parent.prev = None;
        parent.next = None;

        trace!(depth, "Split bucket");

        true
    }

    /// Remove a contact from this routing table.
    pub fn remove(&mut self, contact: &Contact) {
        let bucket = self.find(&contact.id);

        self.buckets[bucket.0]
            .contacts
            .retain(|existing| existing != contact);
    }

    /// Returns `true` if this exact contact (same Id and address) is in the table.
    pub fn has(&self, contact: &Contact) -> bool {
        self.bucket(self.find(&contact.id))
            .iter()
            .any(|existing| existing == contact)
    }

    /// Move a contact to the most recently seen end of its bucket.
    pub fn update_last_seen(&mut self, contact: &Contact) {
        let bucket = self.find(&contact.id);
        let contacts = &mut self.buckets[bucket.0].contacts;

        if let Some(index) = contacts.iter().position(|existing| existing == contact) {
            let existing = contacts.remove(index);
            contacts.push(existing);
        }
    }

    /// Record that `contact` was just heard from.
    ///
    /// Moves it to the most recently seen end of its bucket, replacing the
    /// address of an existing entry with the same Id, or inserts it.
    pub fn refresh(&mut self, contact: Contact) -> bool {
        if contact.id == self.id {
            return false;
        }

        let bucket = self.find(&contact.id);
        let contacts = &mut self.buckets[bucket.0].contacts;

        if let Some(index) = contacts.iter().position(|existing| existing.id == contact.id) {
            contacts.remove(index);
            contacts.push(contact);
            return true;
        }

        self.insert(contact)
    }

    /// Return up to `n` contacts near `id`, starting from its governing bucket
    /// and widening to neighbouring leaves in both directions.
    ///
    /// The result is sorted by XOR distance to `id`, but is only exact among
    /// the buckets visited.
    pub fn find_closest(&self, id: &Id, n: usize) -> Vec<Contact> {
        let home = self.bucket(self.find(id));
        let mut closest = home.contacts.clone();

        let mut prev = home.prev;
        let mut next = home.next;

        while closest.len() < n && (prev.is_some() || next.is_some()) {
            if let Some(bucket) = prev.map(|prev| self.bucket(prev)) {
                closest.extend_from_slice(&bucket.contacts);
                prev = bucket.prev;
            }

            if let Some(bucket) = next.map(|next| self.bucket(next)) {
                closest.extend_from_slice(&bucket.contacts);
                next = bucket.next;
            }
        }

        let closeness = Id::closeness(*id);
        closest.sort_by(|a, b| closeness(&a.id, &b.id));
        closest.truncate(n);

        closest
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.leaves().all(|bucket| bucket.contacts.is_empty())
    }

    /// Return the number of contacts in this routing table.
    pub fn size(&self) -> usize {
        self.leaves().map(|bucket| bucket.contacts.len()).sum()
    }

    /// Returns an iterator over the leaf buckets, in identifier order.
    pub fn leaves(&self) -> Leaves<'_> {
        let mut first = ROOT;
        while let Some(left) = self.bucket(first).left {
            first = left;
        }

        Leaves {
            table: self,
            current: Some(first),
        }
    }

    /// Returns an iterator over all the contacts in this routing table.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.leaves().flat_map(|bucket| bucket.iter())
    }

    /// Export an owned vector of contacts from this routing table.
    pub fn to_owned_contacts(&self) -> Vec<Contact> {
        self.contacts().copied().collect()
    }
}

pub struct Leaves<'a> {
    table: &'a RoutingTable,
    current: Option<BucketId>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a Bucket;

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = self.table.bucket(self.current?);
        self.current = bucket.next;

        Some(bucket)
    }
}
