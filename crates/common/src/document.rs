use crate::entities::{
    Account, Certificate, RestartAction, Settings, StoredCertificate, ValidationMethod,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 持久化的完整配置文档
///
/// 每次保存都会整体重写，不存在局部更新。
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
    #[serde(default)]
    pub validations: Vec<ValidationMethod>,
    #[serde(default)]
    pub actions: Vec<RestartAction>,
    #[serde(default)]
    pub cert_store: Vec<StoredCertificate>,
}

/// 可按主键存取的持久化实体
pub trait Entity: Clone + Send + Sync + 'static {
    type Key: PartialEq + Send + Sync;

    fn key(&self) -> &Self::Key;
    fn table(doc: &ConfigDocument) -> &[Self];
    fn table_mut(doc: &mut ConfigDocument) -> &mut Vec<Self>;
}

impl Entity for Account {
    type Key = Uuid;

    fn key(&self) -> &Uuid {
        &self.id
    }

    fn table(doc: &ConfigDocument) -> &[Self] {
        &doc.accounts
    }

    fn table_mut(doc: &mut ConfigDocument) -> &mut Vec<Self> {
        &mut doc.accounts
    }
}

impl Entity for Certificate {
    type Key = Uuid;

    fn key(&self) -> &Uuid {
        &self.id
    }

    fn table(doc: &ConfigDocument) -> &[Self] {
        &doc.certificates
    }

    fn table_mut(doc: &mut ConfigDocument) -> &mut Vec<Self> {
        &mut doc.certificates
    }
}

impl Entity for ValidationMethod {
    type Key = Uuid;

    fn key(&self) -> &Uuid {
        &self.id
    }

    fn table(doc: &ConfigDocument) -> &[Self] {
        &doc.validations
    }

    fn table_mut(doc: &mut ConfigDocument) -> &mut Vec<Self> {
        &mut doc.validations
    }
}

impl Entity for RestartAction {
    type Key = Uuid;

    fn key(&self) -> &Uuid {
        &self.id
    }

    fn table(doc: &ConfigDocument) -> &[Self] {
        &doc.actions
    }

    fn table_mut(doc: &mut ConfigDocument) -> &mut Vec<Self> {
        &mut doc.actions
    }
}

impl Entity for StoredCertificate {
    type Key = String;

    fn key(&self) -> &String {
        &self.refid
    }

    fn table(doc: &ConfigDocument) -> &[Self] {
        &doc.cert_store
    }

    fn table_mut(doc: &mut ConfigDocument) -> &mut Vec<Self> {
        &mut doc.cert_store
    }
}

impl ConfigDocument {
    pub fn get<E: Entity>(&self, key: &E::Key) -> Option<&E> {
        E::table(self).iter().find(|e| e.key() == key)
    }

    /// 按主键替换已有实体，不存在时追加，保持原有顺序
    pub fn upsert<E: Entity>(&mut self, entity: E) {
        let table = E::table_mut(self);
        match table.iter().position(|e| e.key() == entity.key()) {
            Some(index) => table[index] = entity,
            None => table.push(entity),
        }
    }
}
