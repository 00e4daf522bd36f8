//! # Ledger Operations
//!
//! The single entry point for every mutation of wallet or social state.
//! Each operation here is one atomic unit: balance checks are re-performed
//! inside the sled transaction against the live record, the balance
//! mutation and its transaction record(s) land together, and on any
//! precondition failure the whole transaction aborts with no partial
//! effects. sled retries the closure automatically on write conflicts, so
//! concurrent callers serialize without any locking in this crate.
//!
//! ## Operations
//!
//! | Operation            | Trees touched                | Records written        |
//! |----------------------|------------------------------|------------------------|
//! | recharge             | users, transactions          | 1 × Recharge           |
//! | exchange             | users, transactions          | 1 × Exchange           |
//! | transfer             | users, transactions          | Sent + Received pair   |
//! | gift                 | users, transactions          | Sent + Received pair   |
//! | request_withdrawal   | users, transactions          | 1 × Withdrawal (Pending)|
//! | send_friend_request  | users, friend_requests       | global + inbox copy    |
//! | accept/reject/cancel | users, friend_requests       | updates + deletions    |
//! | remove_friend        | users                        | none                   |

use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use thiserror::Error;
use uuid::Uuid;

use crate::config;
use crate::loyalty::{self, LoyaltyCard, LoyaltyStatus};
use crate::social::{FriendRequest, RequestStateError};
use crate::store::db::{inbox_key, pair_key, request_key, tx_key, DbError, LedgerDb};
use crate::store::records::{OrderRecord, OrderStatus, UserRecord};
use crate::transaction::{TransactionKind, TransactionRecord, TransactionStatus};
use crate::wallet::{gifts, packages, BalanceError, Currency, Wallet};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No user record exists for the given id.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// A user record already exists for the given id.
    #[error("user already exists: {0}")]
    UserExists(String),

    /// No recharge package with the given id in the catalog.
    #[error("unknown recharge package: {0}")]
    UnknownPackage(u32),

    /// No gift with the given id in the catalog.
    #[error("unknown gift: {0}")]
    UnknownGift(String),

    /// The requested amount is zero. Zero-amount operations are no-ops
    /// and almost certainly a caller bug.
    #[error("amount must be greater than zero")]
    InvalidAmount,

    /// A balance operation failed (insufficient funds or overflow).
    #[error("balance error: {0}")]
    Balance(#[from] BalanceError),

    /// Transfers require an existing mutual friendship.
    #[error("users are not friends: {user} and {other}")]
    NotFriends {
        /// The user who attempted the transfer.
        user: String,
        /// The intended recipient.
        other: String,
    },

    /// Transfers and gifts to oneself are rejected.
    #[error("sender and recipient are the same user")]
    SelfTransfer,

    /// The diamond balance's cash value is below the payout floor.
    #[error(
        "withdrawal below minimum: balance is worth {value_millimes} millimes, minimum is {minimum_millimes}"
    )]
    WithdrawalBelowMinimum {
        /// Cash value of the current diamond balance.
        value_millimes: u64,
        /// The configured floor.
        minimum_millimes: u64,
    },

    /// No friend request exists for the given id.
    #[error("unknown friend request: {0}")]
    UnknownRequest(String),

    /// The request has already been resolved.
    #[error(transparent)]
    RequestState(#[from] RequestStateError),

    /// The caller is not the party allowed to perform this action on the
    /// request (receiver for accept/reject, sender for cancel).
    #[error("request {id} does not belong to {user}")]
    NotYourRequest {
        /// The request being acted on.
        id: String,
        /// The caller.
        user: String,
    },

    /// The two users are already friends.
    #[error("users are already friends: {0} and {1}")]
    AlreadyFriends(String, String),

    /// A pending request already exists between the two users.
    #[error("a friend request between {0} and {1} is already pending")]
    RequestAlreadyPending(String, String),

    /// Exchange-rate arithmetic overflowed.
    #[error("exchange amount out of range")]
    RateOverflow,

    /// Storage-layer failure.
    #[error("storage error: {0}")]
    Db(#[from] DbError),

    /// A stored document failed to decode. Indicates corruption or a
    /// schema change without migration.
    #[error("corrupt record: {0}")]
    Codec(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// Direction of a coin/diamond exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeDirection {
    /// 1:1, no fee.
    DiamondsToCoins,
    /// 70% rate; the 30% fee is charged here and only here.
    CoinsToDiamonds,
}

/// Outcome of a single-party operation: the wallet after the commit and the
/// record that was appended.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// The owner's wallet after the operation.
    pub wallet: Wallet,
    /// The history record written in the same commit.
    pub record: TransactionRecord,
}

/// Outcome of a two-party operation (transfer or gift).
#[derive(Debug, Clone)]
pub struct PairedReceipt {
    /// Sender's wallet after the debit.
    pub sender_wallet: Wallet,
    /// Recipient's wallet after the credit.
    pub recipient_wallet: Wallet,
    /// The record in the sender's history.
    pub sent: TransactionRecord,
    /// The record in the recipient's history.
    pub received: TransactionRecord,
}

/// Loyalty tiering view: the summary plus the rendered card wall.
#[derive(Debug, Clone)]
pub struct LoyaltyView {
    pub status: LoyaltyStatus,
    pub cards: Vec<LoyaltyCard>,
}

// ---------------------------------------------------------------------------
// Transaction-closure helpers
// ---------------------------------------------------------------------------

type TxAbort = ConflictableTransactionError<LedgerError>;

fn abort<T>(err: LedgerError) -> Result<T, TxAbort> {
    Err(ConflictableTransactionError::Abort(err))
}

fn tx_encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, TxAbort> {
    bincode::serialize(value)
        .map_err(|e| ConflictableTransactionError::Abort(LedgerError::Codec(e.to_string())))
}

fn tx_decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, TxAbort> {
    bincode::deserialize(bytes)
        .map_err(|e| ConflictableTransactionError::Abort(LedgerError::Codec(e.to_string())))
}

fn balance_guard<T>(res: Result<T, BalanceError>) -> Result<T, TxAbort> {
    res.map_err(|e| ConflictableTransactionError::Abort(LedgerError::Balance(e)))
}

fn commit<T>(res: Result<T, TransactionError<LedgerError>>) -> LedgerResult<T> {
    match res {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(LedgerError::Db(DbError::Sled(err))),
    }
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The operations facade over [`LedgerDb`].
///
/// Cheap to clone; the underlying sled handles are reference-counted.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: LedgerDb,
}

impl Ledger {
    /// Wraps an opened database.
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Read access to the underlying store.
    pub fn db(&self) -> &LedgerDb {
        &self.db
    }

    // -- Users --------------------------------------------------------------

    /// Creates a user record with an empty wallet.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UserExists`] if the id is taken.
    pub fn create_user(
        &self,
        id: &str,
        display_name: &str,
        push_token: Option<String>,
    ) -> LedgerResult<UserRecord> {
        let timestamp = now_ms();
        let result = self.db.users.transaction(|users| {
            if users.get(id.as_bytes())?.is_some() {
                return abort(LedgerError::UserExists(id.to_string()));
            }
            let mut user = UserRecord::new(id, display_name, timestamp);
            user.push_token = push_token.clone();
            users.insert(id.as_bytes(), tx_encode(&user)?)?;
            Ok(user)
        });
        let user = commit(result)?;
        tracing::debug!(user = %user.id, "user created");
        Ok(user)
    }

    /// Retrieves a user record, failing on unknown ids.
    pub fn get_user(&self, id: &str) -> LedgerResult<UserRecord> {
        self.db
            .get_user(id)?
            .ok_or_else(|| LedgerError::UnknownUser(id.to_string()))
    }

    // -- Wallet operations --------------------------------------------------

    /// Purchases a recharge package: credits `coins + bonus` and appends
    /// one `Recharge` record with the price metadata.
    ///
    /// Always additive, so there is no balance precondition.
    pub fn recharge(&self, user_id: &str, package_id: u32) -> LedgerResult<Receipt> {
        let package = *packages::by_id(package_id)
            .ok_or(LedgerError::UnknownPackage(package_id))?;
        let timestamp = now_ms();
        let record_id = new_id();

        let result = (&self.db.users, &self.db.transactions).transaction(|(users, txs)| {
            let mut user: UserRecord = match users.get(user_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(LedgerError::UnknownUser(user_id.to_string())),
            };

            balance_guard(user.wallet.credit(Currency::Coins, package.total_coins()))?;
            users.insert(user_id.as_bytes(), tx_encode(&user)?)?;

            let mut record = TransactionRecord::new(
                record_id.clone(),
                user_id,
                TransactionKind::Recharge,
                timestamp,
            );
            record.amount_coins = package.total_coins();
            record.amount_millimes = package.price_millimes;
            record.description = format!(
                "Coin Pack Purchase ({} + {} Bonus)",
                package.coins, package.bonus
            );
            txs.insert(tx_key(user_id, timestamp, &record_id), tx_encode(&record)?)?;

            Ok(Receipt {
                wallet: user.wallet,
                record,
            })
        });

        let receipt = commit(result)?;
        tracing::debug!(
            user = user_id,
            package = package_id,
            coins = receipt.record.amount_coins,
            "recharge completed"
        );
        Ok(receipt)
    }

    /// Converts between coins and diamonds.
    ///
    /// `DiamondsToCoins` is 1:1; `CoinsToDiamonds` credits
    /// `ceil(amount * 7/10)` diamonds, charging the 30% fee. The source
    /// balance is checked against the live record inside the transaction.
    pub fn exchange(
        &self,
        user_id: &str,
        direction: ExchangeDirection,
        amount: u64,
    ) -> LedgerResult<Receipt> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let timestamp = now_ms();
        let record_id = new_id();

        let result = (&self.db.users, &self.db.transactions).transaction(|(users, txs)| {
            let mut user: UserRecord = match users.get(user_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(LedgerError::UnknownUser(user_id.to_string())),
            };

            let (amount_coins, amount_diamonds, description) = match direction {
                ExchangeDirection::DiamondsToCoins => {
                    let coins = match config::diamonds_to_coins(amount) {
                        Some(c) => c,
                        None => return abort(LedgerError::RateOverflow),
                    };
                    balance_guard(user.wallet.debit(Currency::Diamonds, amount))?;
                    balance_guard(user.wallet.credit(Currency::Coins, coins))?;
                    (coins, amount, "Diamonds to Coins Exchange".to_string())
                }
                ExchangeDirection::CoinsToDiamonds => {
                    let diamonds = match config::coins_to_diamonds(amount) {
                        Some(d) => d,
                        None => return abort(LedgerError::RateOverflow),
                    };
                    balance_guard(user.wallet.debit(Currency::Coins, amount))?;
                    balance_guard(user.wallet.credit(Currency::Diamonds, diamonds))?;
                    (
                        amount,
                        diamonds,
                        "Coins to Diamonds Exchange (30% fee)".to_string(),
                    )
                }
            };

            users.insert(user_id.as_bytes(), tx_encode(&user)?)?;

            let mut record = TransactionRecord::new(
                record_id.clone(),
                user_id,
                TransactionKind::Exchange,
                timestamp,
            );
            record.amount_coins = amount_coins;
            record.amount_diamonds = amount_diamonds;
            record.description = description;
            txs.insert(tx_key(user_id, timestamp, &record_id), tx_encode(&record)?)?;

            Ok(Receipt {
                wallet: user.wallet,
                record,
            })
        });

        commit(result)
    }

    /// Transfers coins or diamonds to a mutual friend.
    ///
    /// The friendship edge and the sender's balance are both verified
    /// against the live records inside the transaction. Writes the paired
    /// `TransferSent` / `TransferReceived` records.
    pub fn transfer(
        &self,
        sender_id: &str,
        recipient_id: &str,
        currency: Currency,
        amount: u64,
    ) -> LedgerResult<PairedReceipt> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if sender_id == recipient_id {
            return Err(LedgerError::SelfTransfer);
        }
        let timestamp = now_ms();
        let sent_id = new_id();
        let received_id = new_id();

        let result = (&self.db.users, &self.db.transactions).transaction(|(users, txs)| {
            let mut sender: UserRecord = match users.get(sender_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(LedgerError::UnknownUser(sender_id.to_string())),
            };
            let mut recipient: UserRecord = match users.get(recipient_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(LedgerError::UnknownUser(recipient_id.to_string())),
            };

            // The edge must exist on both sides.
            if !sender.is_friends_with(recipient_id) || !recipient.is_friends_with(sender_id) {
                return abort(LedgerError::NotFriends {
                    user: sender_id.to_string(),
                    other: recipient_id.to_string(),
                });
            }

            balance_guard(sender.wallet.debit(currency, amount))?;
            balance_guard(recipient.wallet.credit(currency, amount))?;

            users.insert(sender_id.as_bytes(), tx_encode(&sender)?)?;
            users.insert(recipient_id.as_bytes(), tx_encode(&recipient)?)?;

            let (coins, diamonds) = match currency {
                Currency::Coins => (amount, 0),
                Currency::Diamonds => (0, amount),
            };

            let mut sent = TransactionRecord::new(
                sent_id.clone(),
                sender_id,
                TransactionKind::TransferSent,
                timestamp,
            );
            sent.amount_coins = coins;
            sent.amount_diamonds = diamonds;
            sent.counterparty = Some(recipient_id.to_string());
            sent.description = format!("Transfer to {}", recipient.display_name);

            let mut received = TransactionRecord::new(
                received_id.clone(),
                recipient_id,
                TransactionKind::TransferReceived,
                timestamp,
            );
            received.amount_coins = coins;
            received.amount_diamonds = diamonds;
            received.counterparty = Some(sender_id.to_string());
            received.description = format!("Transfer from {}", sender.display_name);

            txs.insert(tx_key(sender_id, timestamp, &sent_id), tx_encode(&sent)?)?;
            txs.insert(
                tx_key(recipient_id, timestamp, &received_id),
                tx_encode(&received)?,
            )?;

            Ok(PairedReceipt {
                sender_wallet: sender.wallet,
                recipient_wallet: recipient.wallet,
                sent,
                received,
            })
        });

        let receipt = commit(result)?;
        tracing::debug!(
            sender = sender_id,
            recipient = recipient_id,
            %currency,
            amount,
            "transfer completed"
        );
        Ok(receipt)
    }

    /// Sends a gift: the sender pays the gift's coin price, the recipient
    /// earns its diamond value. No friendship requirement; gifts go to
    /// live-stream hosts, not just friends.
    pub fn gift(
        &self,
        sender_id: &str,
        recipient_id: &str,
        gift_id: &str,
    ) -> LedgerResult<PairedReceipt> {
        let gift = *gifts::by_id(gift_id)
            .ok_or_else(|| LedgerError::UnknownGift(gift_id.to_string()))?;
        if sender_id == recipient_id {
            return Err(LedgerError::SelfTransfer);
        }
        let timestamp = now_ms();
        let sent_id = new_id();
        let received_id = new_id();

        let result = (&self.db.users, &self.db.transactions).transaction(|(users, txs)| {
            let mut sender: UserRecord = match users.get(sender_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(LedgerError::UnknownUser(sender_id.to_string())),
            };
            let mut recipient: UserRecord = match users.get(recipient_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(LedgerError::UnknownUser(recipient_id.to_string())),
            };

            balance_guard(sender.wallet.debit(Currency::Coins, gift.price_coins))?;
            balance_guard(recipient.wallet.credit(Currency::Diamonds, gift.diamonds()))?;

            users.insert(sender_id.as_bytes(), tx_encode(&sender)?)?;
            users.insert(recipient_id.as_bytes(), tx_encode(&recipient)?)?;

            let mut sent = TransactionRecord::new(
                sent_id.clone(),
                sender_id,
                TransactionKind::GiftSent,
                timestamp,
            );
            sent.amount_coins = gift.price_coins;
            sent.counterparty = Some(recipient_id.to_string());
            sent.description = format!("{} to {}", gift.name, recipient.display_name);

            let mut received = TransactionRecord::new(
                received_id.clone(),
                recipient_id,
                TransactionKind::GiftReceived,
                timestamp,
            );
            received.amount_diamonds = gift.diamonds();
            received.counterparty = Some(sender_id.to_string());
            received.description = format!("{} from {}", gift.name, sender.display_name);

            txs.insert(tx_key(sender_id, timestamp, &sent_id), tx_encode(&sent)?)?;
            txs.insert(
                tx_key(recipient_id, timestamp, &received_id),
                tx_encode(&received)?,
            )?;

            Ok(PairedReceipt {
                sender_wallet: sender.wallet,
                recipient_wallet: recipient.wallet,
                sent,
                received,
            })
        });

        commit(result)
    }

    /// Files a withdrawal request: drains the full diamond balance and
    /// appends one `Withdrawal` record in `Pending` status. Settlement is
    /// manual; this only records the request.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::WithdrawalBelowMinimum`] when the balance's
    /// cash value is under the payout floor.
    pub fn request_withdrawal(&self, user_id: &str) -> LedgerResult<Receipt> {
        let timestamp = now_ms();
        let record_id = new_id();

        let result = (&self.db.users, &self.db.transactions).transaction(|(users, txs)| {
            let mut user: UserRecord = match users.get(user_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(LedgerError::UnknownUser(user_id.to_string())),
            };

            let diamonds = user.wallet.diamonds;
            let value_millimes = match config::diamond_cash_value_millimes(diamonds) {
                Some(v) => v,
                None => return abort(LedgerError::RateOverflow),
            };
            if value_millimes < config::MIN_WITHDRAWAL_MILLIMES {
                return abort(LedgerError::WithdrawalBelowMinimum {
                    value_millimes,
                    minimum_millimes: config::MIN_WITHDRAWAL_MILLIMES,
                });
            }

            user.wallet.drain_diamonds();
            users.insert(user_id.as_bytes(), tx_encode(&user)?)?;

            let mut record = TransactionRecord::new(
                record_id.clone(),
                user_id,
                TransactionKind::Withdrawal,
                timestamp,
            );
            record.amount_diamonds = diamonds;
            record.amount_millimes = value_millimes;
            record.status = TransactionStatus::Pending;
            record.description = "Withdrawal Request".to_string();
            txs.insert(tx_key(user_id, timestamp, &record_id), tx_encode(&record)?)?;

            Ok(Receipt {
                wallet: user.wallet,
                record,
            })
        });

        let receipt = commit(result)?;
        tracing::info!(
            user = user_id,
            millimes = receipt.record.amount_millimes,
            "withdrawal requested"
        );
        Ok(receipt)
    }

    // -- Friend requests ----------------------------------------------------

    /// Sends a friend request.
    ///
    /// Writes the global record, the receiver's inbox copy, and the
    /// pending-pair marker in one commit.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AlreadyFriends`] if the edge exists,
    /// [`LedgerError::RequestAlreadyPending`] if a request between the pair
    /// (either direction) is outstanding.
    pub fn send_friend_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> LedgerResult<FriendRequest> {
        if sender_id == receiver_id {
            return Err(LedgerError::SelfTransfer);
        }
        let timestamp = now_ms();
        let request_id = new_id();

        let result =
            (&self.db.users, &self.db.friend_requests).transaction(|(users, requests)| {
                let sender: UserRecord = match users.get(sender_id.as_bytes())? {
                    Some(bytes) => tx_decode(&bytes)?,
                    None => return abort(LedgerError::UnknownUser(sender_id.to_string())),
                };
                let receiver: UserRecord = match users.get(receiver_id.as_bytes())? {
                    Some(bytes) => tx_decode(&bytes)?,
                    None => return abort(LedgerError::UnknownUser(receiver_id.to_string())),
                };

                if sender.is_friends_with(receiver_id) {
                    return abort(LedgerError::AlreadyFriends(
                        sender_id.to_string(),
                        receiver_id.to_string(),
                    ));
                }
                if requests.get(pair_key(sender_id, receiver_id))?.is_some() {
                    return abort(LedgerError::RequestAlreadyPending(
                        sender_id.to_string(),
                        receiver_id.to_string(),
                    ));
                }

                let request = FriendRequest::new(
                    request_id.clone(),
                    sender_id,
                    &sender.display_name,
                    receiver_id,
                    &receiver.display_name,
                    timestamp,
                );
                let bytes = tx_encode(&request)?;
                requests.insert(request_key(&request_id), bytes.clone())?;
                requests.insert(inbox_key(receiver_id, &request_id), bytes)?;
                requests.insert(
                    pair_key(sender_id, receiver_id),
                    request_id.as_bytes().to_vec(),
                )?;

                Ok(request)
            });

        commit(result)
    }

    /// Accepts a pending request: adds each user to the other's friend
    /// list, marks the global record accepted, and clears the inbox copy
    /// and pair marker, all in one commit.
    pub fn accept_friend_request(
        &self,
        receiver_id: &str,
        request_id: &str,
    ) -> LedgerResult<FriendRequest> {
        let result =
            (&self.db.users, &self.db.friend_requests).transaction(|(users, requests)| {
                let mut request: FriendRequest = match requests.get(request_key(request_id))? {
                    Some(bytes) => tx_decode(&bytes)?,
                    None => return abort(LedgerError::UnknownRequest(request_id.to_string())),
                };
                if request.receiver != receiver_id {
                    return abort(LedgerError::NotYourRequest {
                        id: request_id.to_string(),
                        user: receiver_id.to_string(),
                    });
                }
                if let Err(e) = request.accept() {
                    return abort(LedgerError::RequestState(e));
                }

                let mut sender: UserRecord = match users.get(request.sender.as_bytes())? {
                    Some(bytes) => tx_decode(&bytes)?,
                    None => return abort(LedgerError::UnknownUser(request.sender.clone())),
                };
                let mut receiver: UserRecord = match users.get(receiver_id.as_bytes())? {
                    Some(bytes) => tx_decode(&bytes)?,
                    None => return abort(LedgerError::UnknownUser(receiver_id.to_string())),
                };

                sender.add_friend(receiver_id);
                receiver.add_friend(&request.sender);
                users.insert(request.sender.as_bytes(), tx_encode(&sender)?)?;
                users.insert(receiver_id.as_bytes(), tx_encode(&receiver)?)?;

                requests.insert(request_key(request_id), tx_encode(&request)?)?;
                requests.remove(inbox_key(receiver_id, request_id))?;
                requests.remove(pair_key(&request.sender, receiver_id))?;

                Ok(request)
            });

        let request = commit(result)?;
        tracing::debug!(
            sender = %request.sender,
            receiver = %request.receiver,
            "friend request accepted"
        );
        Ok(request)
    }

    /// Rejects a pending request: deletes the inbox copy and marks the
    /// global record rejected. The friend lists are untouched.
    pub fn reject_friend_request(
        &self,
        receiver_id: &str,
        request_id: &str,
    ) -> LedgerResult<FriendRequest> {
        let result = self.db.friend_requests.transaction(|requests| {
            let mut request: FriendRequest = match requests.get(request_key(request_id))? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(LedgerError::UnknownRequest(request_id.to_string())),
            };
            if request.receiver != receiver_id {
                return abort(LedgerError::NotYourRequest {
                    id: request_id.to_string(),
                    user: receiver_id.to_string(),
                });
            }
            if let Err(e) = request.reject() {
                return abort(LedgerError::RequestState(e));
            }

            requests.insert(request_key(request_id), tx_encode(&request)?)?;
            requests.remove(inbox_key(receiver_id, request_id))?;
            requests.remove(pair_key(&request.sender, receiver_id))?;

            Ok(request)
        });

        commit(result)
    }

    /// Cancels a pending request the caller sent: deletes the global
    /// record, the receiver's inbox copy, and the pair marker.
    pub fn cancel_friend_request(&self, sender_id: &str, request_id: &str) -> LedgerResult<()> {
        let result = self.db.friend_requests.transaction(|requests| {
            let request: FriendRequest = match requests.get(request_key(request_id))? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(LedgerError::UnknownRequest(request_id.to_string())),
            };
            if request.sender != sender_id {
                return abort(LedgerError::NotYourRequest {
                    id: request_id.to_string(),
                    user: sender_id.to_string(),
                });
            }
            if !request.is_pending() {
                return abort(LedgerError::RequestState(RequestStateError::NotPending {
                    id: request.id.clone(),
                    status: request.status,
                }));
            }

            requests.remove(request_key(request_id))?;
            requests.remove(inbox_key(&request.receiver, request_id))?;
            requests.remove(pair_key(sender_id, &request.receiver))?;

            Ok(())
        });

        commit(result)
    }

    /// Dissolves a friendship: removes each user from the other's friend
    /// list in one commit.
    pub fn remove_friend(&self, user_id: &str, friend_id: &str) -> LedgerResult<()> {
        let result = self.db.users.transaction(|users| {
            let mut user: UserRecord = match users.get(user_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(LedgerError::UnknownUser(user_id.to_string())),
            };
            let mut friend: UserRecord = match users.get(friend_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(LedgerError::UnknownUser(friend_id.to_string())),
            };

            user.remove_friend(friend_id);
            friend.remove_friend(user_id);
            users.insert(user_id.as_bytes(), tx_encode(&user)?)?;
            users.insert(friend_id.as_bytes(), tx_encode(&friend)?)?;

            Ok(())
        });

        commit(result)
    }

    // -- Orders & loyalty ---------------------------------------------------

    /// Records an order. Only the delivered ones feed the loyalty tiering;
    /// the rest are stored for completeness of the count's audit trail.
    pub fn record_order(
        &self,
        user_id: &str,
        status: OrderStatus,
        total_millimes: u64,
    ) -> LedgerResult<OrderRecord> {
        // Existence check: an order for an unknown user is a caller bug.
        self.get_user(user_id)?;

        let order = OrderRecord {
            id: new_id(),
            user: user_id.to_string(),
            status,
            total_millimes,
            timestamp_ms: now_ms(),
        };
        self.db.put_order(&order)?;
        Ok(order)
    }

    /// Computes the loyalty tiering view from the user's delivered orders.
    pub fn loyalty(&self, user_id: &str) -> LedgerResult<LoyaltyView> {
        self.get_user(user_id)?;
        let delivered = self.db.delivered_order_count(user_id)?;
        Ok(LoyaltyView {
            status: loyalty::tiering(delivered),
            cards: loyalty::card_wall(delivered),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::RequestStatus;

    fn ledger() -> Ledger {
        Ledger::new(LedgerDb::open_temporary().expect("temp db"))
    }

    /// Creates a user and seeds the wallet directly through the store.
    fn seed_user(ledger: &Ledger, id: &str, coins: u64, diamonds: u64) {
        ledger.create_user(id, &format!("User {id}"), None).unwrap();
        let mut user = ledger.get_user(id).unwrap();
        user.wallet = Wallet::with_balances(coins, diamonds);
        ledger.db().put_user(&user).unwrap();
    }

    /// Creates the mutual friendship edge through the request handshake.
    fn befriend(ledger: &Ledger, a: &str, b: &str) {
        let request = ledger.send_friend_request(a, b).unwrap();
        ledger.accept_friend_request(b, &request.id).unwrap();
    }

    // -- Users ---------------------------------------------------------------

    #[test]
    fn create_user_rejects_duplicates() {
        let ledger = ledger();
        ledger.create_user("alice", "Alice", None).unwrap();
        let result = ledger.create_user("alice", "Alice Again", None);
        assert!(matches!(result, Err(LedgerError::UserExists(_))));
    }

    #[test]
    fn get_unknown_user_fails() {
        let ledger = ledger();
        assert!(matches!(
            ledger.get_user("ghost"),
            Err(LedgerError::UnknownUser(_))
        ));
    }

    // -- Recharge ------------------------------------------------------------

    #[test]
    fn recharge_credits_exact_package_amount() {
        let ledger = ledger();
        ledger.create_user("alice", "Alice", None).unwrap();

        // Package 1: 100 coins, no bonus, 3.000 TND.
        let receipt = ledger.recharge("alice", 1).unwrap();
        assert_eq!(receipt.wallet.coins, 100);
        assert_eq!(receipt.record.kind, TransactionKind::Recharge);
        assert_eq!(receipt.record.amount_coins, 100);
        assert_eq!(receipt.record.amount_millimes, 3_000);
        assert_eq!(receipt.record.status, TransactionStatus::Completed);

        // Exactly one record appended.
        let history = ledger.db().recent_transactions("alice", 20).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, receipt.record.id);
    }

    #[test]
    fn recharge_includes_bonus() {
        let ledger = ledger();
        ledger.create_user("alice", "Alice", None).unwrap();
        let receipt = ledger.recharge("alice", 2).unwrap();
        assert_eq!(receipt.wallet.coins, 600);
        assert_eq!(receipt.record.amount_coins, 600);
    }

    #[test]
    fn recharge_unknown_package_rejected() {
        let ledger = ledger();
        ledger.create_user("alice", "Alice", None).unwrap();
        assert!(matches!(
            ledger.recharge("alice", 42),
            Err(LedgerError::UnknownPackage(42))
        ));
        assert!(ledger.db().recent_transactions("alice", 20).unwrap().is_empty());
    }

    // -- Exchange ------------------------------------------------------------

    #[test]
    fn exchange_diamonds_to_coins_is_one_to_one() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 100);

        let receipt = ledger
            .exchange("alice", ExchangeDirection::DiamondsToCoins, 40)
            .unwrap();
        assert_eq!(receipt.wallet.diamonds, 60);
        assert_eq!(receipt.wallet.coins, 40);
        assert_eq!(receipt.record.amount_coins, 40);
        assert_eq!(receipt.record.amount_diamonds, 40);
    }

    #[test]
    fn exchange_coins_to_diamonds_charges_fee() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 100, 0);

        let receipt = ledger
            .exchange("alice", ExchangeDirection::CoinsToDiamonds, 100)
            .unwrap();
        // ceil(100 * 0.7) = 70 diamonds, coins debited in full.
        assert_eq!(receipt.wallet.coins, 0);
        assert_eq!(receipt.wallet.diamonds, 70);
        assert_eq!(receipt.record.amount_coins, 100);
        assert_eq!(receipt.record.amount_diamonds, 70);
    }

    #[test]
    fn exchange_rounds_fee_up_in_users_favor() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 15, 0);
        let receipt = ledger
            .exchange("alice", ExchangeDirection::CoinsToDiamonds, 15)
            .unwrap();
        // ceil(15 * 0.7) = ceil(10.5) = 11.
        assert_eq!(receipt.wallet.diamonds, 11);
    }

    #[test]
    fn exchange_zero_amount_rejected() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 100, 100);
        assert!(matches!(
            ledger.exchange("alice", ExchangeDirection::DiamondsToCoins, 0),
            Err(LedgerError::InvalidAmount)
        ));
    }

    #[test]
    fn exchange_insufficient_balance_leaves_no_trace() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 10, 5);

        let result = ledger.exchange("alice", ExchangeDirection::CoinsToDiamonds, 11);
        assert!(matches!(
            result,
            Err(LedgerError::Balance(BalanceError::InsufficientBalance { .. }))
        ));

        // No mutation, no record.
        let user = ledger.get_user("alice").unwrap();
        assert_eq!(user.wallet.coins, 10);
        assert_eq!(user.wallet.diamonds, 5);
        assert!(ledger.db().recent_transactions("alice", 20).unwrap().is_empty());
    }

    #[test]
    fn exchange_round_trip_never_gains_diamonds() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 100);

        ledger
            .exchange("alice", ExchangeDirection::DiamondsToCoins, 100)
            .unwrap();
        let receipt = ledger
            .exchange("alice", ExchangeDirection::CoinsToDiamonds, 100)
            .unwrap();
        assert!(receipt.wallet.diamonds <= 100);
        assert_eq!(receipt.wallet.diamonds, 70);
    }

    // -- Transfer ------------------------------------------------------------

    #[test]
    fn transfer_between_friends_moves_balance_and_writes_pair() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 100, 0);
        seed_user(&ledger, "bob", 0, 0);
        befriend(&ledger, "alice", "bob");

        let receipt = ledger
            .transfer("alice", "bob", Currency::Coins, 30)
            .unwrap();
        assert_eq!(receipt.sender_wallet.coins, 70);
        assert_eq!(receipt.recipient_wallet.coins, 30);

        assert_eq!(receipt.sent.kind, TransactionKind::TransferSent);
        assert_eq!(receipt.sent.counterparty.as_deref(), Some("bob"));
        assert_eq!(receipt.received.kind, TransactionKind::TransferReceived);
        assert_eq!(receipt.received.counterparty.as_deref(), Some("alice"));

        // One record per party, same commit.
        assert_eq!(ledger.db().recent_transactions("alice", 20).unwrap().len(), 1);
        assert_eq!(ledger.db().recent_transactions("bob", 20).unwrap().len(), 1);
    }

    #[test]
    fn transfer_between_non_friends_rejected_without_writes() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 100, 0);
        seed_user(&ledger, "bob", 0, 0);

        let result = ledger.transfer("alice", "bob", Currency::Coins, 30);
        assert!(matches!(result, Err(LedgerError::NotFriends { .. })));

        // Before/after balance equality on both parties, no records.
        assert_eq!(ledger.get_user("alice").unwrap().wallet.coins, 100);
        assert_eq!(ledger.get_user("bob").unwrap().wallet.coins, 0);
        assert!(ledger.db().recent_transactions("alice", 20).unwrap().is_empty());
        assert!(ledger.db().recent_transactions("bob", 20).unwrap().is_empty());
    }

    #[test]
    fn transfer_over_balance_rejected_without_partial_mutation() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 20, 0);
        seed_user(&ledger, "bob", 0, 0);
        befriend(&ledger, "alice", "bob");

        let result = ledger.transfer("alice", "bob", Currency::Coins, 21);
        assert!(matches!(
            result,
            Err(LedgerError::Balance(BalanceError::InsufficientBalance {
                available: 20,
                requested: 21,
                ..
            }))
        ));
        assert_eq!(ledger.get_user("alice").unwrap().wallet.coins, 20);
        assert_eq!(ledger.get_user("bob").unwrap().wallet.coins, 0);
        assert!(ledger.db().recent_transactions("bob", 20).unwrap().is_empty());
    }

    #[test]
    fn transfer_diamonds_uses_diamond_balance() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 50);
        seed_user(&ledger, "bob", 0, 0);
        befriend(&ledger, "alice", "bob");

        let receipt = ledger
            .transfer("alice", "bob", Currency::Diamonds, 50)
            .unwrap();
        assert_eq!(receipt.sender_wallet.diamonds, 0);
        assert_eq!(receipt.recipient_wallet.diamonds, 50);
        assert_eq!(receipt.sent.amount_diamonds, 50);
        assert_eq!(receipt.sent.amount_coins, 0);
    }

    #[test]
    fn transfer_to_self_rejected() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 100, 0);
        assert!(matches!(
            ledger.transfer("alice", "alice", Currency::Coins, 10),
            Err(LedgerError::SelfTransfer)
        ));
    }

    // -- Gift ----------------------------------------------------------------

    #[test]
    fn gift_converts_coins_to_diamonds_across_users() {
        let ledger = ledger();
        seed_user(&ledger, "viewer", 500, 0);
        seed_user(&ledger, "host", 0, 0);

        let receipt = ledger.gift("viewer", "host", "crown").unwrap();
        assert_eq!(receipt.sender_wallet.coins, 0);
        assert_eq!(receipt.recipient_wallet.diamonds, 500);
        assert_eq!(receipt.sent.kind, TransactionKind::GiftSent);
        assert_eq!(receipt.received.kind, TransactionKind::GiftReceived);
        assert!(receipt.sent.description.contains("Crown"));
    }

    #[test]
    fn gift_without_funds_rejected() {
        let ledger = ledger();
        seed_user(&ledger, "viewer", 0, 0);
        seed_user(&ledger, "host", 0, 0);
        assert!(matches!(
            ledger.gift("viewer", "host", "rose"),
            Err(LedgerError::Balance(BalanceError::InsufficientBalance { .. }))
        ));
    }

    #[test]
    fn gift_unknown_id_rejected() {
        let ledger = ledger();
        seed_user(&ledger, "viewer", 500, 0);
        seed_user(&ledger, "host", 0, 0);
        assert!(matches!(
            ledger.gift("viewer", "host", "yacht"),
            Err(LedgerError::UnknownGift(_))
        ));
    }

    // -- Withdrawal ----------------------------------------------------------

    #[test]
    fn withdrawal_drains_diamonds_and_records_pending() {
        let ledger = ledger();
        // 5000 diamonds = exactly the 50 TND minimum.
        seed_user(&ledger, "alice", 0, 5_000);

        let receipt = ledger.request_withdrawal("alice").unwrap();
        assert_eq!(receipt.wallet.diamonds, 0);
        assert_eq!(receipt.record.kind, TransactionKind::Withdrawal);
        assert_eq!(receipt.record.status, TransactionStatus::Pending);
        assert_eq!(receipt.record.amount_diamonds, 5_000);
        assert_eq!(receipt.record.amount_millimes, 50_000);
    }

    #[test]
    fn withdrawal_below_minimum_rejected() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 4_999);

        let result = ledger.request_withdrawal("alice");
        assert!(matches!(
            result,
            Err(LedgerError::WithdrawalBelowMinimum {
                value_millimes: 49_990,
                ..
            })
        ));
        // Balance untouched.
        assert_eq!(ledger.get_user("alice").unwrap().wallet.diamonds, 4_999);
    }

    // -- Friend requests -----------------------------------------------------

    #[test]
    fn friend_request_lifecycle_accept() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 0);
        seed_user(&ledger, "bob", 0, 0);

        let request = ledger.send_friend_request("alice", "bob").unwrap();
        assert!(request.is_pending());

        // Visible to both parties: bob's inbox and alice's outgoing list.
        let inbox = ledger.db().pending_requests_for("bob").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].sender, "alice");
        let outgoing = ledger.db().pending_requests_from("alice").unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].id, request.id);

        let accepted = ledger.accept_friend_request("bob", &request.id).unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);

        // The edge is mutual.
        assert!(ledger.get_user("alice").unwrap().is_friends_with("bob"));
        assert!(ledger.get_user("bob").unwrap().is_friends_with("alice"));

        // Inbox copy is gone; global record survives as accepted.
        assert!(ledger.db().pending_requests_for("bob").unwrap().is_empty());
        assert!(ledger.db().pending_requests_from("alice").unwrap().is_empty());
        let global = ledger.db().get_request(&request.id).unwrap().unwrap();
        assert_eq!(global.status, RequestStatus::Accepted);
    }

    #[test]
    fn friend_request_lifecycle_reject() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 0);
        seed_user(&ledger, "bob", 0, 0);

        let request = ledger.send_friend_request("alice", "bob").unwrap();
        let rejected = ledger.reject_friend_request("bob", &request.id).unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);

        // No edge, empty inbox, global record marked rejected.
        assert!(!ledger.get_user("alice").unwrap().is_friends_with("bob"));
        assert!(ledger.db().pending_requests_for("bob").unwrap().is_empty());
        let global = ledger.db().get_request(&request.id).unwrap().unwrap();
        assert_eq!(global.status, RequestStatus::Rejected);
    }

    #[test]
    fn resolved_request_is_terminal() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 0);
        seed_user(&ledger, "bob", 0, 0);

        let request = ledger.send_friend_request("alice", "bob").unwrap();
        ledger.accept_friend_request("bob", &request.id).unwrap();

        // A second resolution of either kind fails.
        assert!(matches!(
            ledger.accept_friend_request("bob", &request.id),
            Err(LedgerError::RequestState(_))
        ));
        assert!(matches!(
            ledger.reject_friend_request("bob", &request.id),
            Err(LedgerError::RequestState(_))
        ));
    }

    #[test]
    fn duplicate_pending_request_rejected_both_directions() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 0);
        seed_user(&ledger, "bob", 0, 0);

        ledger.send_friend_request("alice", "bob").unwrap();
        assert!(matches!(
            ledger.send_friend_request("alice", "bob"),
            Err(LedgerError::RequestAlreadyPending(..))
        ));
        // The reverse direction is also blocked while one is outstanding.
        assert!(matches!(
            ledger.send_friend_request("bob", "alice"),
            Err(LedgerError::RequestAlreadyPending(..))
        ));
    }

    #[test]
    fn request_to_existing_friend_rejected() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 0);
        seed_user(&ledger, "bob", 0, 0);
        befriend(&ledger, "alice", "bob");

        assert!(matches!(
            ledger.send_friend_request("alice", "bob"),
            Err(LedgerError::AlreadyFriends(..))
        ));
    }

    #[test]
    fn resolved_request_allows_a_fresh_one() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 0);
        seed_user(&ledger, "bob", 0, 0);

        let first = ledger.send_friend_request("alice", "bob").unwrap();
        ledger.reject_friend_request("bob", &first.id).unwrap();

        // The pair marker was cleared, so alice can try again.
        let second = ledger.send_friend_request("alice", "bob").unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn cancel_removes_request_entirely() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 0);
        seed_user(&ledger, "bob", 0, 0);

        let request = ledger.send_friend_request("alice", "bob").unwrap();
        ledger.cancel_friend_request("alice", &request.id).unwrap();

        assert!(ledger.db().get_request(&request.id).unwrap().is_none());
        assert!(ledger.db().pending_requests_for("bob").unwrap().is_empty());
        // And a fresh request can follow.
        ledger.send_friend_request("bob", "alice").unwrap();
    }

    #[test]
    fn only_the_receiver_may_accept() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 0);
        seed_user(&ledger, "bob", 0, 0);
        seed_user(&ledger, "mallory", 0, 0);

        let request = ledger.send_friend_request("alice", "bob").unwrap();
        assert!(matches!(
            ledger.accept_friend_request("mallory", &request.id),
            Err(LedgerError::NotYourRequest { .. })
        ));
        // Sender can't accept their own request either.
        assert!(matches!(
            ledger.accept_friend_request("alice", &request.id),
            Err(LedgerError::NotYourRequest { .. })
        ));
    }

    #[test]
    fn remove_friend_breaks_edge_and_blocks_transfers() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 100, 0);
        seed_user(&ledger, "bob", 0, 0);
        befriend(&ledger, "alice", "bob");

        ledger.remove_friend("alice", "bob").unwrap();
        assert!(!ledger.get_user("alice").unwrap().is_friends_with("bob"));
        assert!(!ledger.get_user("bob").unwrap().is_friends_with("alice"));

        assert!(matches!(
            ledger.transfer("alice", "bob", Currency::Coins, 10),
            Err(LedgerError::NotFriends { .. })
        ));
    }

    // -- Loyalty -------------------------------------------------------------

    #[test]
    fn loyalty_counts_delivered_orders_only() {
        let ledger = ledger();
        seed_user(&ledger, "alice", 0, 0);

        for _ in 0..12 {
            ledger
                .record_order("alice", OrderStatus::Delivered, 25_000)
                .unwrap();
        }
        ledger
            .record_order("alice", OrderStatus::Cancelled, 25_000)
            .unwrap();
        ledger
            .record_order("alice", OrderStatus::Placed, 25_000)
            .unwrap();

        let view = ledger.loyalty("alice").unwrap();
        assert_eq!(view.status.delivered_orders, 12);
        assert_eq!(view.status.completed_cards, 1);
        assert_eq!(view.status.active_points, 2);
        assert_eq!(view.cards.len(), config::CARD_WALL_SIZE);
    }
}
